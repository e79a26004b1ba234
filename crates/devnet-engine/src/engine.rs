//! Engine trait definitions
//!
//! - `Engine`: enclave lifecycle (exists/create/get/destroy)
//! - `Enclave`: file artifacts and package runs inside one enclave
//!
//! Both traits are async and backend-agnostic. `KurtosisCli` drives a real
//! engine; in-memory fakes live in the `fakes` module.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::events::ProgressEvent;

/// Package run when none is configured.
pub const DEFAULT_PACKAGE: &str = "github.com/Layr-Labs/avs-devnet/kurtosis_package";

/// Prefix marking a package locator as remote.
pub const REMOTE_PACKAGE_PREFIX: &str = "github.com/";

/// Capacity of the channel carrying run events to the interpreter.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Name under which an uploaded file artifact can be referenced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(name: impl Into<String>) -> Self {
        ArtifactId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The package to run inside the enclave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLocator {
    /// Hosted package, e.g. `github.com/org/repo/path`.
    Remote(String),
    /// Package directory on the local machine.
    Local(PathBuf),
}

impl PackageLocator {
    /// `github.com/...` is remote, anything else is a local directory.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with(REMOTE_PACKAGE_PREFIX) {
            PackageLocator::Remote(raw.to_string())
        } else {
            PackageLocator::Local(PathBuf::from(raw))
        }
    }

    /// Anchor a relative local package at `base_dir`.
    pub fn resolve(self, base_dir: &Path) -> Self {
        match self {
            PackageLocator::Local(path) if path.is_relative() => {
                PackageLocator::Local(base_dir.join(path))
            }
            other => other,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, PackageLocator::Remote(_))
    }
}

impl Default for PackageLocator {
    fn default() -> Self {
        PackageLocator::Remote(DEFAULT_PACKAGE.to_string())
    }
}

impl fmt::Display for PackageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageLocator::Remote(url) => f.write_str(url),
            PackageLocator::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Connection to an orchestration engine.
///
/// Guarantees:
/// - `create_enclave(name)` fails with `EnclaveAlreadyExists` if `name` is taken.
/// - `get_enclave` and `destroy_enclave` fail with `EnclaveNotFound` for unknown names.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Whether an enclave called `name` exists.
    async fn enclave_exists(&self, name: &str) -> Result<bool>;

    /// Create a new, empty enclave.
    async fn create_enclave(&self, name: &str) -> Result<Arc<dyn Enclave>>;

    /// Handle to an existing enclave.
    async fn get_enclave(&self, name: &str) -> Result<Arc<dyn Enclave>>;

    /// Destroy an enclave and everything running in it.
    async fn destroy_enclave(&self, name: &str) -> Result<()>;
}

/// A running enclave.
#[async_trait]
pub trait Enclave: Send + Sync {
    /// Enclave name.
    fn name(&self) -> &str;

    /// Upload the contents of `dir` as a file artifact called `artifact`.
    async fn upload_files(&self, dir: &Path, artifact: &str) -> Result<ArtifactId>;

    /// Download the file artifact `artifact` into the existing directory `dest`.
    async fn download_files(&self, artifact: &str, dest: &Path) -> Result<()>;

    /// Start a package run with serialized `params` and return its event stream.
    ///
    /// Events arrive in engine order; the channel closes when the run ends or
    /// `cancel` fires.
    async fn run_package(
        &self,
        package: &PackageLocator,
        params: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ProgressEvent>>;
}
