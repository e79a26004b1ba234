//! Devnet flows: `init`, `start` and `stop`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use devnet_config::{DevnetConfig, DEFAULT_CONFIG};
use devnet_engine::{Engine, PackageLocator};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::build::{build_images, ImageBuilder};
use crate::enclave::EnclaveManager;
use crate::error::{DevnetError, Result};
use crate::progress::{report_progress, RunOutcome};
use crate::reporter::Reporter;
use crate::tooling::{DockerBuilder, ForgeFlattener, HttpFetcher, ToolConfig};
use crate::upload::{
    local_repo_deployments, upload_local_repos, upload_static_artifacts, FileFetcher,
    ScriptFlattener,
};

/// What to start.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Enclave name.
    pub devnet_name: String,
    /// Directory relative paths in the config are resolved against.
    pub base_dir: PathBuf,
    pub config: DevnetConfig,
    /// Package run inside the enclave.
    pub package: PackageLocator,
}

/// External tools used while starting a devnet.
#[derive(Clone)]
pub struct Toolchain {
    pub builder: Arc<dyn ImageBuilder>,
    pub flattener: Arc<dyn ScriptFlattener>,
    pub fetcher: Arc<dyn FileFetcher>,
    pub max_parallel_builds: usize,
}

impl Toolchain {
    /// Process-backed tools named by `tools`.
    pub fn from_config(tools: &ToolConfig) -> Self {
        Self {
            builder: Arc::new(DockerBuilder::new(tools)),
            flattener: Arc::new(ForgeFlattener::new(tools)),
            fetcher: Arc::new(HttpFetcher::new()),
            max_parallel_builds: tools.max_parallel_builds,
        }
    }
}

/// Write the starter configuration to `path`, refusing to overwrite.
pub async fn init(path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Err(DevnetError::ConfigExists(path.to_path_buf()));
    }
    tokio::fs::write(path, DEFAULT_CONFIG).await?;
    info!(path = %path.display(), "Initialized configuration file");
    Ok(())
}

/// Start a devnet.
///
/// Order: existence check, config validation, image builds, enclave
/// creation, uploads (local repos and static artifacts concurrently), package
/// run, progress interpretation. A failed build leaves no enclave behind.
#[instrument(skip_all, fields(devnet = %opts.devnet_name))]
pub async fn start(
    engine: Arc<dyn Engine>,
    opts: &StartOptions,
    tools: &Toolchain,
    reporter: &mut dyn Reporter,
    cancel: &CancellationToken,
) -> Result<()> {
    let manager = EnclaveManager::new(engine);
    if manager.exists(&opts.devnet_name).await? {
        return Err(DevnetError::AlreadyRunning(opts.devnet_name.clone()));
    }

    // config errors surface before any external side effect
    opts.config.static_artifacts()?;
    local_repo_deployments(&opts.base_dir, &opts.config)?;

    build_images(
        &opts.base_dir,
        &opts.config.services,
        Arc::clone(&tools.builder),
        tools.max_parallel_builds,
        cancel,
    )
    .await?;

    let enclave = manager.create(&opts.devnet_name).await?;

    let (scripts, artifacts) = tokio::try_join!(
        upload_local_repos(
            &opts.base_dir,
            &opts.config,
            enclave.as_ref(),
            tools.flattener.as_ref(),
            cancel,
        ),
        upload_static_artifacts(
            &opts.base_dir,
            &opts.config,
            enclave.as_ref(),
            tools.fetcher.as_ref(),
            cancel,
        ),
    )?;
    info!(
        scripts = scripts.len(),
        artifacts = artifacts.len(),
        "Uploaded files"
    );

    info!(package = %opts.package, "Starting devnet...");
    let mut events = enclave
        .run_package(&opts.package, opts.config.to_yaml(), cancel.clone())
        .await?;

    match report_progress(&mut events, reporter, cancel).await? {
        RunOutcome::Finished { success: true, .. } => Ok(()),
        RunOutcome::Finished {
            success: false,
            output,
        } => Err(DevnetError::RunFailed { output }),
        RunOutcome::StreamEnded => Err(DevnetError::RunIncomplete),
    }
}

/// Stop a devnet, failing with `EnclaveNotFound` if it isn't running.
#[instrument(skip(engine))]
pub async fn stop(engine: Arc<dyn Engine>, devnet_name: &str) -> Result<()> {
    EnclaveManager::new(engine).destroy(devnet_name).await
}
