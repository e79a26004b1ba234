//! Event stream -> reporter call sequences for whole runs.

use std::io;

use devnet_core::{
    report_progress, ExecutionStep, ProgressError, Reporter, RunOutcome, ValidationStep,
};
use devnet_engine::{EngineFault, FaultKind, ProgressEvent, ProgressInfo};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    InterpretationStart,
    ValidationStart(u32),
    ValidationStep(ValidationStep),
    ExecutionStart(u32),
    ExecutionStep(ExecutionStep),
    Info(String),
    Warning(String),
    RunFinished(bool, String),
}

#[derive(Default)]
struct Recorder {
    calls: Vec<Call>,
}

impl Reporter for Recorder {
    fn report_interpretation_start(&mut self) -> io::Result<()> {
        self.calls.push(Call::InterpretationStart);
        Ok(())
    }

    fn report_validation_start(&mut self, total_steps: u32) -> io::Result<()> {
        self.calls.push(Call::ValidationStart(total_steps));
        Ok(())
    }

    fn report_validation_step(&mut self, step: ValidationStep) -> io::Result<()> {
        self.calls.push(Call::ValidationStep(step));
        Ok(())
    }

    fn report_execution_start(&mut self, total_steps: u32) -> io::Result<()> {
        self.calls.push(Call::ExecutionStart(total_steps));
        Ok(())
    }

    fn report_execution_step(&mut self, step: ExecutionStep) -> io::Result<()> {
        self.calls.push(Call::ExecutionStep(step));
        Ok(())
    }

    fn report_info(&mut self, message: &str) -> io::Result<()> {
        self.calls.push(Call::Info(message.to_string()));
        Ok(())
    }

    fn report_warning(&mut self, message: &str) -> io::Result<()> {
        self.calls.push(Call::Warning(message.to_string()));
        Ok(())
    }

    fn report_run_finished(&mut self, success: bool, output: &str) -> io::Result<()> {
        self.calls.push(Call::RunFinished(success, output.to_string()));
        Ok(())
    }
}

fn progress(description: &str, total: u32, step: u32) -> ProgressEvent {
    ProgressEvent::ProgressInfo(ProgressInfo {
        step_info: vec![description.to_string()],
        total_steps: total,
        current_step: step,
    })
}

fn instruction(description: &str) -> ProgressEvent {
    ProgressEvent::Instruction {
        description: description.to_string(),
    }
}

fn instruction_result(serialized: &str) -> ProgressEvent {
    ProgressEvent::InstructionResult {
        serialized: serialized.to_string(),
    }
}

fn finished(success: bool, output: &str) -> ProgressEvent {
    ProgressEvent::RunFinished {
        success,
        output: output.to_string(),
    }
}

async fn replay(
    events: Vec<ProgressEvent>,
) -> (Result<RunOutcome, ProgressError>, Vec<Call>) {
    let (tx, mut rx) = mpsc::channel(events.len().max(1));
    for event in events {
        tx.send(event).await.unwrap();
    }
    drop(tx);
    let mut recorder = Recorder::default();
    let outcome = report_progress(&mut rx, &mut recorder, &CancellationToken::new()).await;
    (outcome, recorder.calls)
}

fn validation(step: u32) -> Call {
    Call::ValidationStep(ValidationStep {
        current_step: step,
        total_steps: 3,
        description: "Validating plan X".to_string(),
        details: vec![],
    })
}

fn execution(instruction: Option<&str>, result: Option<&str>) -> Call {
    Call::ExecutionStep(ExecutionStep {
        current_step: -1,
        total_steps: 5,
        description: "Starting execution".to_string(),
        instruction: instruction.map(str::to_string),
        result: result.map(str::to_string),
    })
}

#[tokio::test]
async fn full_run_reports_every_phase_in_order() {
    let (outcome, calls) = replay(vec![
        progress("Interpreting plan - execution will begin shortly", 0, 0),
        progress("Validating plan X", 3, 1),
        progress("Validating plan X", 3, 3),
        progress("Starting execution", 5, 0),
        instruction("deploy A"),
        instruction_result("0xabc"),
        finished(true, "ok"),
    ])
    .await;

    assert_eq!(
        outcome.unwrap(),
        RunOutcome::Finished {
            success: true,
            output: "ok".to_string()
        }
    );
    assert_eq!(
        calls,
        vec![
            Call::InterpretationStart,
            Call::ValidationStart(3),
            validation(1),
            validation(3),
            Call::ExecutionStart(5),
            execution(Some("deploy A"), None),
            execution(Some("deploy A"), Some("0xabc")),
            Call::RunFinished(true, "ok".to_string()),
        ]
    );
}

#[tokio::test]
async fn execution_error_stops_reporting() {
    let (outcome, calls) = replay(vec![
        progress("Starting execution", 2, 0),
        instruction("deploy A"),
        ProgressEvent::Error(EngineFault {
            kind: FaultKind::Execution,
            message: "contract reverted".to_string(),
        }),
        instruction_result("never seen"),
        finished(true, "never seen"),
    ])
    .await;

    let err = outcome.unwrap_err();
    assert!(matches!(
        &err,
        ProgressError::Engine { kind: FaultKind::Execution, message } if message == "contract reverted"
    ));
    assert!(err.to_string().contains("contract reverted"));
    assert_eq!(calls.len(), 2);
    assert!(!calls
        .iter()
        .any(|call| matches!(call, Call::RunFinished(..))));
}

#[tokio::test]
async fn phase_never_goes_back_after_execution() {
    let (_, calls) = replay(vec![
        progress("Starting execution", 4, 1),
        progress("Interpreting plan", 0, 0),
        progress("Validating plan again", 9, 2),
        finished(false, "boom"),
    ])
    .await;

    assert!(!calls.contains(&Call::InterpretationStart));
    assert!(!calls
        .iter()
        .any(|call| matches!(call, Call::ValidationStart(_) | Call::ValidationStep(_))));
    assert_eq!(
        calls.last(),
        Some(&Call::RunFinished(false, "boom".to_string()))
    );
}

#[tokio::test]
async fn info_and_warning_pass_through_in_any_phase() {
    let (outcome, calls) = replay(vec![
        ProgressEvent::Info("Container images used in this run".to_string()),
        ProgressEvent::Warning("image pull slow".to_string()),
    ])
    .await;

    assert_eq!(outcome.unwrap(), RunOutcome::StreamEnded);
    assert_eq!(
        calls,
        vec![
            Call::Info("Container images used in this run".to_string()),
            Call::Warning("image pull slow".to_string()),
        ]
    );
}

#[tokio::test]
async fn validation_details_come_from_extra_step_lines() {
    let (_, calls) = replay(vec![ProgressEvent::ProgressInfo(ProgressInfo {
        step_info: vec![
            "Validating plan".to_string(),
            "pulling image foundry".to_string(),
        ],
        total_steps: 2,
        current_step: 1,
    })])
    .await;

    assert_eq!(
        calls,
        vec![
            Call::ValidationStart(2),
            Call::ValidationStep(ValidationStep {
                current_step: 1,
                total_steps: 2,
                description: "Validating plan".to_string(),
                details: vec!["pulling image foundry".to_string()],
            }),
        ]
    );
}

fn validation_of(step: u32, total: u32) -> Call {
    Call::ValidationStep(ValidationStep {
        current_step: step,
        total_steps: total,
        description: "Validating plan".to_string(),
        details: vec![],
    })
}

#[tokio::test]
async fn reinterpreting_the_plan_restarts_validation() {
    let (_, calls) = replay(vec![
        progress("Interpreting plan", 0, 0),
        progress("Validating plan", 3, 1),
        progress("Interpreting plan", 0, 0),
        progress("Starting validation", 9, 0),
        progress("Validating plan", 4, 1),
    ])
    .await;

    assert_eq!(
        calls,
        vec![
            Call::InterpretationStart,
            Call::ValidationStart(3),
            validation_of(1, 3),
            Call::InterpretationStart,
            Call::ValidationStart(4),
            validation_of(1, 4),
        ]
    );
}

#[tokio::test]
async fn validation_total_ignores_starting_validation() {
    let (_, calls) = replay(vec![
        progress("Interpreting plan", 0, 0),
        progress("Starting validation", 12, 0),
        progress("Validating plan", 3, 1),
    ])
    .await;

    assert_eq!(
        calls,
        vec![
            Call::InterpretationStart,
            Call::ValidationStart(3),
            validation_of(1, 3),
        ]
    );
}

#[tokio::test]
async fn execution_steps_count_completed_steps() {
    let (_, calls) = replay(vec![
        progress("Starting execution", 5, 0),
        progress("Adding service", 5, 3),
        instruction("add_service(name=\"app\")"),
        progress("Running script", 5, 5),
    ])
    .await;

    let steps: Vec<(i64, u32, String, Option<String>)> = calls
        .iter()
        .filter_map(|call| match call {
            Call::ExecutionStep(step) => Some((
                step.current_step,
                step.total_steps,
                step.description.clone(),
                step.instruction.clone(),
            )),
            _ => None,
        })
        .collect();

    assert_eq!(calls[0], Call::ExecutionStart(5));
    assert_eq!(
        steps,
        vec![
            (2, 5, "Adding service".to_string(), None),
            (
                2,
                5,
                "Adding service".to_string(),
                Some("add_service(name=\"app\")".to_string())
            ),
            (4, 5, "Running script".to_string(), None),
        ]
    );
}
