use std::io;

use tracing::{debug, info, warn};

use super::Reporter;
use crate::progress::{ExecutionStep, ValidationStep};

/// Reporter emitting one structured `tracing` event per callback.
///
/// Instruction results are logged at `info` only when `verbose` is set.
#[derive(Debug, Clone, Default)]
pub struct LogReporter {
    verbose: bool,
}

impl LogReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Reporter for LogReporter {
    fn report_interpretation_start(&mut self) -> io::Result<()> {
        info!("Interpreting plan");
        Ok(())
    }

    fn report_validation_start(&mut self, total_steps: u32) -> io::Result<()> {
        info!(total_steps, "Validating plan");
        Ok(())
    }

    fn report_validation_step(&mut self, step: ValidationStep) -> io::Result<()> {
        debug!(
            step = step.current_step,
            total = step.total_steps,
            details = %step.details.join(", "),
            "{}",
            step.description
        );
        Ok(())
    }

    fn report_execution_start(&mut self, total_steps: u32) -> io::Result<()> {
        info!(total_steps, "Starting execution");
        Ok(())
    }

    fn report_execution_step(&mut self, step: ExecutionStep) -> io::Result<()> {
        match (&step.instruction, &step.result) {
            (_, Some(result)) if self.verbose => {
                info!(step = step.current_step, total = step.total_steps, %result, "Instruction finished")
            }
            (_, Some(result)) => {
                debug!(step = step.current_step, total = step.total_steps, %result, "Instruction finished")
            }
            (Some(instruction), None) => {
                info!(step = step.current_step, total = step.total_steps, "{instruction}")
            }
            (None, None) => {
                debug!(step = step.current_step, total = step.total_steps, "{}", step.description)
            }
        }
        Ok(())
    }

    fn report_info(&mut self, message: &str) -> io::Result<()> {
        info!("{message}");
        Ok(())
    }

    fn report_warning(&mut self, message: &str) -> io::Result<()> {
        warn!("{message}");
        Ok(())
    }

    fn report_run_finished(&mut self, success: bool, output: &str) -> io::Result<()> {
        if success {
            info!(%output, "Run finished successfully");
        } else {
            warn!(%output, "Run failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_steps_without_start() {
        let mut reporter = LogReporter::new(true);
        reporter
            .report_execution_step(ExecutionStep {
                current_step: -1,
                total_steps: 0,
                description: String::new(),
                instruction: None,
                result: Some("0x1".to_string()),
            })
            .unwrap();
        reporter
            .report_validation_step(ValidationStep {
                current_step: 1,
                total_steps: 0,
                description: "Validating plan".to_string(),
                details: vec![],
            })
            .unwrap();
    }
}
