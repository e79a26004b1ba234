//! Devnet-Engine: the orchestration engine boundary
//!
//! Everything the devnet tool needs from the engine that hosts it: enclave
//! lifecycle, file artifacts, and package runs reported as a stream of
//! [`ProgressEvent`]s.
//!
//! ## Key Components
//!
//! - `Engine` / `Enclave`: async traits at the engine seam
//! - `ProgressEvent`: decoded run events, one variant per response kind
//! - `KurtosisCli`: engine driven through the `kurtosis` command
//! - `fakes::MemoryEngine`: in-memory engine for tests

pub mod engine;
pub mod error;
pub mod events;
pub mod fakes;
pub mod kurtosis;

pub use engine::{
    ArtifactId, Enclave, Engine, PackageLocator, DEFAULT_PACKAGE, EVENT_CHANNEL_CAPACITY,
    REMOTE_PACKAGE_PREFIX,
};
pub use error::{EngineError, Result};
pub use events::{EngineFault, FaultKind, ProgressEvent, ProgressInfo, ResponseLine};
pub use kurtosis::{KurtosisCli, DEFAULT_KURTOSIS_PROGRAM};
