//! Progress interpretation for package runs.
//!
//! Turns the engine's ordered [`ProgressEvent`] stream into phase and step
//! callbacks on a [`Reporter`]. The run goes through three phases:
//!
//! ```text
//! Interpretation ──"Validating plan" (total != 0)──▶ Validation
//!   ▲    │                                              │  │
//!   │    └──────────────"Starting execution"────────────┴──┼──▶ Execution
//!   └────────────────────"Interpreting plan"───────────────┘
//! ```
//!
//! A plan may be interpreted again after validation started; the next
//! `"Validating plan"` then restarts validation with its own total.
//!
//! The total carried by the engine's `"Starting validation"` message counts
//! execution steps, not validation steps, so it is ignored. The validation
//! total is taken from the first `"Validating plan"` message with a non-zero
//! total instead.

use devnet_engine::{ProgressEvent, ProgressInfo};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProgressError;
use crate::reporter::Reporter;

const INTERPRETING_PLAN: &str = "Interpreting plan";
const STARTING_VALIDATION: &str = "Starting validation";
const VALIDATING_PLAN: &str = "Validating plan";
const STARTING_EXECUTION: &str = "Starting execution";

/// Phase of a package run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Interpretation,
    Validation,
    Execution,
}

/// One validation step, as reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationStep {
    pub current_step: u32,
    pub total_steps: u32,
    pub description: String,
    pub details: Vec<String>,
}

/// One execution step, as reported.
///
/// `current_step` counts completed steps and is `-1` before the first step
/// of the run starts. The same step may be reported several times with more
/// detail each time: description, then instruction, then instruction result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStep {
    pub current_step: i64,
    pub total_steps: u32,
    pub description: String,
    pub instruction: Option<String>,
    pub result: Option<String>,
}

impl ExecutionStep {
    fn from_info(info: &ProgressInfo, total_steps: u32) -> Self {
        Self {
            // the engine reports the step about to run
            current_step: i64::from(info.current_step) - 1,
            total_steps,
            description: info.description().to_string(),
            instruction: None,
            result: None,
        }
    }
}

/// Whether interpretation should keep reading events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished { success: bool, output: String },
}

/// How a run's event stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The engine sent its run-finished event.
    Finished { success: bool, output: String },
    /// The stream closed without a run-finished event.
    StreamEnded,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Finished { success: true, .. })
    }
}

/// State machine over a single run's events.
#[derive(Debug)]
pub struct ProgressInterpreter {
    phase: Phase,
    total_steps: u32,
    execution: Option<ExecutionStep>,
}

impl Default for ProgressInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressInterpreter {
    pub fn new() -> Self {
        Self {
            phase: Phase::Interpretation,
            total_steps: 0,
            execution: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply one event and forward the resulting callbacks to `reporter`.
    pub fn handle(
        &mut self,
        event: ProgressEvent,
        reporter: &mut dyn Reporter,
    ) -> Result<Flow, ProgressError> {
        match event {
            ProgressEvent::ProgressInfo(info) => self.handle_progress(&info, reporter)?,
            ProgressEvent::Instruction { description } => {
                let step = self.execution_step("instruction")?;
                step.instruction = Some(description);
                reporter.report_execution_step(step.clone())?;
            }
            ProgressEvent::InstructionResult { serialized } => {
                let step = self.execution_step("instruction result")?;
                step.result = Some(serialized);
                reporter.report_execution_step(step.clone())?;
            }
            ProgressEvent::Info(message) => reporter.report_info(&message)?,
            ProgressEvent::Warning(message) => reporter.report_warning(&message)?,
            ProgressEvent::Error(fault) => {
                return Err(ProgressError::Engine {
                    kind: fault.kind,
                    message: fault.message,
                })
            }
            ProgressEvent::RunFinished { success, output } => {
                reporter.report_run_finished(success, &output)?;
                return Ok(Flow::Finished { success, output });
            }
        }
        Ok(Flow::Continue)
    }

    fn handle_progress(
        &mut self,
        info: &ProgressInfo,
        reporter: &mut dyn Reporter,
    ) -> Result<(), ProgressError> {
        let description = info.description();

        if description.starts_with(INTERPRETING_PLAN) {
            if self.phase == Phase::Execution {
                debug!("ignoring interpretation restart during execution");
            } else {
                self.phase = Phase::Interpretation;
                reporter.report_interpretation_start()?;
            }
            return Ok(());
        }

        if description == STARTING_VALIDATION {
            return Ok(());
        }

        if description == STARTING_EXECUTION {
            self.phase = Phase::Execution;
            self.total_steps = info.total_steps;
            self.execution = Some(ExecutionStep::from_info(info, self.total_steps));
            reporter.report_execution_start(self.total_steps)?;
            return Ok(());
        }

        if description.starts_with(VALIDATING_PLAN)
            && self.phase == Phase::Interpretation
            && info.total_steps != 0
        {
            self.phase = Phase::Validation;
            self.total_steps = info.total_steps;
            reporter.report_validation_start(self.total_steps)?;
        }

        match self.phase {
            Phase::Interpretation => {}
            Phase::Validation => reporter.report_validation_step(ValidationStep {
                current_step: info.current_step,
                total_steps: self.total_steps,
                description: description.to_string(),
                details: info.details().to_vec(),
            })?,
            Phase::Execution => {
                let step = ExecutionStep::from_info(info, self.total_steps);
                self.execution = Some(step.clone());
                reporter.report_execution_step(step)?;
            }
        }
        Ok(())
    }

    fn execution_step(&mut self, what: &str) -> Result<&mut ExecutionStep, ProgressError> {
        match (self.phase, self.execution.as_mut()) {
            (Phase::Execution, Some(step)) => Ok(step),
            (phase, _) => Err(ProgressError::ProtocolViolation(format!(
                "received {what} during {phase:?} phase"
            ))),
        }
    }
}

/// Drive a [`ProgressInterpreter`] from `events` until the run finishes.
///
/// Returns on the run-finished event, on the first engine error, when the
/// channel closes, or when `cancel` fires.
pub async fn report_progress(
    events: &mut mpsc::Receiver<ProgressEvent>,
    reporter: &mut dyn Reporter,
    cancel: &CancellationToken,
) -> Result<RunOutcome, ProgressError> {
    let mut interpreter = ProgressInterpreter::new();
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return Err(ProgressError::Cancelled),
            event = events.recv() => event,
        };
        let Some(event) = event else {
            warn!(phase = ?interpreter.phase(), "event stream closed before the run finished");
            return Ok(RunOutcome::StreamEnded);
        };
        if let Flow::Finished { success, output } = interpreter.handle(event, reporter)? {
            return Ok(RunOutcome::Finished { success, output });
        }
    }
}
