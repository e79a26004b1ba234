//! Progress events emitted by the engine while a package runs.
//!
//! The engine's response line is a record with many optional sub-messages of
//! which exactly one is populated. It is decoded once, at this boundary, into
//! the [`ProgressEvent`] sum type; nothing downstream inspects the wire shape.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// One event of a package run, in engine order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Phase/step progress.
    ProgressInfo(ProgressInfo),
    /// Human-readable description of the instruction about to run.
    Instruction { description: String },
    /// Serialized result of the last instruction.
    InstructionResult { serialized: String },
    /// Free-form informational message.
    Info(String),
    /// Free-form warning.
    Warning(String),
    /// The run ended.
    RunFinished { success: bool, output: String },
    /// The engine reported a fatal error.
    Error(EngineFault),
}

/// Payload of a progress-info event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressInfo {
    /// First line is the step description, the rest are detail lines.
    pub step_info: Vec<String>,
    pub total_steps: u32,
    pub current_step: u32,
}

impl ProgressInfo {
    /// Leading description line, empty if the engine sent none.
    pub fn description(&self) -> &str {
        self.step_info.first().map(String::as_str).unwrap_or("")
    }

    /// Detail lines following the description.
    pub fn details(&self) -> &[String] {
        self.step_info.get(1..).unwrap_or(&[])
    }
}

/// Which phase of the run the engine failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Interpretation,
    Validation,
    Execution,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Interpretation => "interpretation",
            FaultKind::Validation => "validation",
            FaultKind::Execution => "execution",
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error event reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFault {
    pub kind: FaultKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// JSON shape of a single engine response line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_info: Option<WireProgressInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<WireInstruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_result: Option<WireInstructionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<WireInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<WireWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_finished_event: Option<WireRunFinished>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireProgressInfo {
    #[serde(default)]
    pub current_step_info: Vec<String>,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub current_step_number: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInstruction {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInstructionResult {
    #[serde(default)]
    pub serialized_instruction_result: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInfo {
    #[serde(default)]
    pub info_message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireWarning {
    #[serde(default)]
    pub warning_message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation_error: Option<WireErrorMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<WireErrorMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<WireErrorMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireErrorMessage {
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRunFinished {
    #[serde(default)]
    pub is_run_successful: bool,
    #[serde(default)]
    pub serialized_output: String,
}

impl TryFrom<ResponseLine> for ProgressEvent {
    type Error = EngineError;

    fn try_from(line: ResponseLine) -> Result<Self> {
        if let Some(info) = line.progress_info {
            return Ok(ProgressEvent::ProgressInfo(ProgressInfo {
                step_info: info.current_step_info,
                total_steps: info.total_steps,
                current_step: info.current_step_number,
            }));
        }
        if let Some(instruction) = line.instruction {
            return Ok(ProgressEvent::Instruction {
                description: instruction.description,
            });
        }
        if let Some(result) = line.instruction_result {
            return Ok(ProgressEvent::InstructionResult {
                serialized: result.serialized_instruction_result,
            });
        }
        if let Some(info) = line.info {
            return Ok(ProgressEvent::Info(info.info_message));
        }
        if let Some(warning) = line.warning {
            return Ok(ProgressEvent::Warning(warning.warning_message));
        }
        if let Some(error) = line.error {
            return decode_fault(error).map(ProgressEvent::Error);
        }
        if let Some(finished) = line.run_finished_event {
            return Ok(ProgressEvent::RunFinished {
                success: finished.is_run_successful,
                output: finished.serialized_output,
            });
        }
        Err(EngineError::Decode(
            "response line has no populated field".to_string(),
        ))
    }
}

fn decode_fault(error: WireError) -> Result<EngineFault> {
    let (kind, inner) = if let Some(e) = error.interpretation_error {
        (FaultKind::Interpretation, e)
    } else if let Some(e) = error.validation_error {
        (FaultKind::Validation, e)
    } else if let Some(e) = error.execution_error {
        (FaultKind::Execution, e)
    } else {
        return Err(EngineError::Decode(
            "error event carries no error variant".to_string(),
        ));
    };
    Ok(EngineFault {
        kind,
        message: inner.error_message,
    })
}

impl ProgressEvent {
    /// Decode a single JSON-encoded response line.
    pub fn from_json_line(line: &str) -> Result<Self> {
        let wire: ResponseLine = serde_json::from_str(line)?;
        ProgressEvent::try_from(wire)
    }
}
