//! Error types for devnet-core

use std::path::PathBuf;

use devnet_config::ConfigError;
use devnet_engine::{EngineError, FaultKind};
use thiserror::Error;

/// Failure of an external tool invocation.
#[derive(Error, Debug)]
pub enum ToolFailure {
    /// The program could not be started
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited unsuccessfully; `output` is stdout followed by stderr
    #[error("`{command}` exited with {status}\n{output}")]
    Exit {
        command: String,
        status: String,
        output: String,
    },

    /// Cancelled before the program finished
    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
}

/// A single failed image build.
#[derive(Error, Debug)]
#[error("building image '{image}' failed: {failure}")]
pub struct ImageBuildFailure {
    pub image: String,
    #[source]
    pub failure: ToolFailure,
}

/// Aggregate of every failed image build.
#[derive(Error, Debug)]
#[error("{} image build(s) failed: {}\n{}", .failures.len(), image_list(.failures), details(.failures))]
pub struct BuildError {
    pub failures: Vec<ImageBuildFailure>,
}

impl BuildError {
    /// Names of the images that failed to build.
    pub fn images(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.image.as_str()).collect()
    }
}

fn image_list(failures: &[ImageBuildFailure]) -> String {
    failures
        .iter()
        .map(|f| f.image.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn details(failures: &[ImageBuildFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Failure fetching a remote static file.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The server answered outside the 2xx range
    #[error("GET request failed with status code {0}")]
    Status(u16),

    /// Connection or body transfer failed
    #[error("GET request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// Errors from staging and uploading files into the enclave.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The deployment script is missing from the local repo
    #[error("deployment '{deployment}': script '{}' doesn't exist", .path.display())]
    ScriptNotFound { deployment: String, path: PathBuf },

    /// `forge install` or `forge flatten` failed
    #[error("deployment '{deployment}' (repo '{}'): {failure}", .repo.display())]
    Flatten {
        deployment: String,
        repo: PathBuf,
        #[source]
        failure: ToolFailure,
    },

    /// Copying a file into the scratch directory failed
    #[error("'{name}': failed copying '{}': {source}", .path.display())]
    Copy {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating the scratch directory failed
    #[error("'{name}': scratch directory creation failed: {source}")]
    Scratch {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Fetching a remote static file failed
    #[error("artifact '{artifact}': fetching '{url}': {source}")]
    Fetch {
        artifact: String,
        url: String,
        #[source]
        source: FetchError,
    },

    /// The engine rejected the upload
    #[error("uploading '{artifact}' failed: {source}")]
    Upload {
        artifact: String,
        #[source]
        source: EngineError,
    },

    /// Invalid configuration detected before uploading
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cancelled by the caller
    #[error("upload cancelled")]
    Cancelled,
}

/// Errors that end progress interpretation.
#[derive(Error, Debug)]
pub enum ProgressError {
    /// The engine reported an error event
    #[error("{kind} error occurred during the run: {message}")]
    Engine { kind: FaultKind, message: String },

    /// The event stream broke an ordering rule
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Cancelled by the caller
    #[error("progress reporting cancelled")]
    Cancelled,

    /// The reporter failed to write
    #[error("reporter failed: {0}")]
    Reporter(#[from] std::io::Error),
}

/// Errors surfaced by the devnet flows.
#[derive(Error, Debug)]
pub enum DevnetError {
    /// An enclave with the devnet's name already exists
    #[error("devnet '{0}' is already running")]
    AlreadyRunning(String),

    /// No enclave with the devnet's name exists
    #[error("devnet '{0}' doesn't exist")]
    EnclaveNotFound(String),

    /// The package run finished unsuccessfully
    #[error("devnet run failed: {output}")]
    RunFailed { output: String },

    /// The event stream closed before the run finished
    #[error("event stream closed before the run finished")]
    RunIncomplete,

    /// `init` would overwrite an existing file
    #[error("config file '{}' already exists", .0.display())]
    ConfigExists(PathBuf),

    /// Malformed `<artifact>:<contract>` query
    #[error("invalid address query '{0}', expected '<artifact>:<contract>'")]
    InvalidQuery(String),

    /// Downloaded artifact holds no JSON document
    #[error("artifact '{0}' contains no JSON file")]
    NoJsonFile(String),

    /// Artifact couldn't be downloaded or parsed
    #[error("artifact '{artifact}' unavailable: {reason}")]
    ArtifactUnavailable { artifact: String, reason: String },

    /// Query matched nothing in the artifact
    #[error("'{query}' not found in artifact '{artifact}'")]
    AddressNotFound { artifact: String, query: String },

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Image build error
    #[error("failed when building images: {0}")]
    Build(#[from] BuildError),

    /// Upload error
    #[error("failed when uploading files: {0}")]
    Upload(#[from] UploadError),

    /// Progress interpretation error
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for devnet flows
pub type Result<T> = std::result::Result<T, DevnetError>;
