//! Build orchestration for local service images.
//!
//! One task per buildable service, bounded by a semaphore. Every task runs to
//! completion and is awaited exactly once; all failures are aggregated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use devnet_config::{ensure_abs, BuildStrategy, Service};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{BuildError, ImageBuildFailure, ToolFailure};

/// Builds container images.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build `image` from `context`, optionally with an explicit build file.
    async fn build(
        &self,
        context: &Path,
        image: &str,
        file: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolFailure>;

    /// Run a custom build command in a shell from `working_dir`.
    async fn run_shell(
        &self,
        command: &str,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ToolFailure>;
}

/// A build resolved against the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildJob {
    Context {
        context: PathBuf,
        file: Option<PathBuf>,
    },
    Command {
        command: String,
        working_dir: PathBuf,
    },
}

/// Image name and resolved job for every service with a build strategy.
pub fn plan_builds(base_dir: &Path, services: &[Service]) -> Vec<(String, BuildJob)> {
    services
        .iter()
        .filter_map(|service| {
            let job = match service.build.as_ref()? {
                BuildStrategy::Context { context, file } => BuildJob::Context {
                    context: ensure_abs(base_dir, context),
                    file: file.as_deref().map(|f| ensure_abs(base_dir, f)),
                },
                BuildStrategy::Command(command) => BuildJob::Command {
                    command: command.clone(),
                    working_dir: base_dir.to_path_buf(),
                },
            };
            Some((service.image.clone(), job))
        })
        .collect()
}

async fn run_job(
    builder: &dyn ImageBuilder,
    image: &str,
    job: &BuildJob,
    cancel: &CancellationToken,
) -> Result<(), ToolFailure> {
    match job {
        BuildJob::Context { context, file } => {
            builder.build(context, image, file.as_deref(), cancel).await
        }
        BuildJob::Command {
            command,
            working_dir,
        } => {
            info!(image, "Building image with custom command");
            builder.run_shell(command, working_dir, cancel).await
        }
    }
}

/// Build every service image that declares a build strategy.
///
/// At most `max_parallel` builds run at once. Individual failures never stop
/// sibling builds; the returned error holds every failure.
#[instrument(skip_all, fields(base_dir = %base_dir.display()))]
pub async fn build_images(
    base_dir: &Path,
    services: &[Service],
    builder: Arc<dyn ImageBuilder>,
    max_parallel: usize,
    cancel: &CancellationToken,
) -> Result<(), BuildError> {
    let jobs = plan_builds(base_dir, services);
    if jobs.is_empty() {
        debug!("no images to build");
        return Ok(());
    }
    info!(count = jobs.len(), "Building images");

    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut handles: Vec<(String, JoinHandle<Result<(), ToolFailure>>)> =
        Vec::with_capacity(jobs.len());

    for (image, job) in jobs {
        let builder = Arc::clone(&builder);
        let permits = Arc::clone(&permits);
        let cancel = cancel.clone();
        let task_image = image.clone();

        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ToolFailure::Cancelled {
                    command: format!("build {task_image}"),
                })?;
            run_job(builder.as_ref(), &task_image, &job, &cancel).await
        });
        handles.push((image, handle));
    }

    let mut failures = Vec::new();
    for (image, handle) in handles {
        let failure = match handle.await {
            Ok(Ok(())) => {
                info!(image = %image, "Image built");
                continue;
            }
            Ok(Err(failure)) => failure,
            Err(join_err) => ToolFailure::Spawn {
                command: format!("build {image}"),
                source: std::io::Error::other(join_err.to_string()),
            },
        };
        warn!(image = %image, error = %failure, "Image build failed");
        failures.push(ImageBuildFailure { image, failure });
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(BuildError { failures })
    }
}
