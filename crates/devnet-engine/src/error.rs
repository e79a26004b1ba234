//! Error types for devnet-engine

use thiserror::Error;

/// Errors that can occur while talking to the orchestration engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// No enclave with this name exists
    #[error("enclave '{0}' doesn't exist")]
    EnclaveNotFound(String),

    /// An enclave with this name already exists
    #[error("enclave '{0}' already exists")]
    EnclaveAlreadyExists(String),

    /// The engine could not be reached or started
    #[error("engine is not available: {0}")]
    EngineUnavailable(String),

    /// An engine command exited unsuccessfully
    #[error("`{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A response line could not be decoded into an event
    #[error("failed to decode engine response: {0}")]
    Decode(String),

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
