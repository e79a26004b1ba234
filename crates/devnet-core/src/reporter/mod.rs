//! Progress reporters.
//!
//! A [`Reporter`] receives the phase and step callbacks produced by the
//! progress interpreter. Calls are synchronous and must not block for long.
//! Step callbacks may arrive without a preceding start callback and must be
//! handled gracefully.

use std::io;

use crate::progress::{ExecutionStep, ValidationStep};

mod log;
mod progress_bar;

pub use self::log::LogReporter;
pub use self::progress_bar::{render_bar, truncate, ProgressBarReporter};

/// Sink for run progress.
pub trait Reporter: Send {
    /// The engine started interpreting the package.
    fn report_interpretation_start(&mut self) -> io::Result<()>;

    /// Validation started with `total_steps` steps.
    fn report_validation_start(&mut self, total_steps: u32) -> io::Result<()>;

    /// A validation step ran.
    fn report_validation_step(&mut self, step: ValidationStep) -> io::Result<()>;

    /// Execution started with `total_steps` steps.
    fn report_execution_start(&mut self, total_steps: u32) -> io::Result<()>;

    /// An execution step progressed. The same step may be reported again
    /// with its instruction and then its result attached.
    fn report_execution_step(&mut self, step: ExecutionStep) -> io::Result<()>;

    /// Informational message from the engine.
    fn report_info(&mut self, message: &str) -> io::Result<()>;

    /// Warning from the engine.
    fn report_warning(&mut self, message: &str) -> io::Result<()>;

    /// The run ended.
    fn report_run_finished(&mut self, success: bool, output: &str) -> io::Result<()>;
}

/// Reporter that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn report_interpretation_start(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn report_validation_start(&mut self, _total_steps: u32) -> io::Result<()> {
        Ok(())
    }

    fn report_validation_step(&mut self, _step: ValidationStep) -> io::Result<()> {
        Ok(())
    }

    fn report_execution_start(&mut self, _total_steps: u32) -> io::Result<()> {
        Ok(())
    }

    fn report_execution_step(&mut self, _step: ExecutionStep) -> io::Result<()> {
        Ok(())
    }

    fn report_info(&mut self, _message: &str) -> io::Result<()> {
        Ok(())
    }

    fn report_warning(&mut self, _message: &str) -> io::Result<()> {
        Ok(())
    }

    fn report_run_finished(&mut self, _success: bool, _output: &str) -> io::Result<()> {
        Ok(())
    }
}
