//! External tool configuration and process-backed tool implementations.
//!
//! Every tool runs as a child process with an explicit working directory;
//! nothing here changes the process-wide current directory.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::build::ImageBuilder;
use crate::error::{FetchError, ToolFailure};
use crate::upload::{FileFetcher, ScriptFlattener};

/// Default bound on concurrently running image builds.
pub const DEFAULT_MAX_PARALLEL_BUILDS: usize = 8;

const ENV_PREFIX: &str = "AVS_DEVNET__";

/// Names of the external programs this tool drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub docker: String,
    pub forge: String,
    pub kurtosis: String,
    pub shell: String,
    pub max_parallel_builds: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            forge: "forge".to_string(),
            kurtosis: devnet_engine::DEFAULT_KURTOSIS_PROGRAM.to_string(),
            shell: "sh".to_string(),
            max_parallel_builds: DEFAULT_MAX_PARALLEL_BUILDS,
        }
    }
}

impl ToolConfig {
    /// Defaults overridden by `AVS_DEVNET__DOCKER`, `AVS_DEVNET__FORGE`,
    /// `AVS_DEVNET__KURTOSIS`, `AVS_DEVNET__SHELL` and
    /// `AVS_DEVNET__MAX_PARALLEL_BUILDS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ToolConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };
        let defaults = Self::default();
        Self {
            docker: var("DOCKER").unwrap_or(defaults.docker),
            forge: var("FORGE").unwrap_or(defaults.forge),
            kurtosis: var("KURTOSIS").unwrap_or(defaults.kurtosis),
            shell: var("SHELL").unwrap_or(defaults.shell),
            max_parallel_builds: var("MAX_PARALLEL_BUILDS")
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_parallel_builds),
        }
    }
}

/// Render a command line for error messages.
fn describe(cmd: &Command) -> String {
    let inner = cmd.as_std();
    std::iter::once(inner.get_program())
        .chain(inner.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `cmd` to completion and return its combined output.
///
/// A non-zero exit is a [`ToolFailure::Exit`] carrying stdout then stderr.
/// Cancellation kills the child.
pub async fn run_tool(mut cmd: Command, cancel: &CancellationToken) -> Result<String, ToolFailure> {
    let command = describe(&cmd);
    debug!(%command, "running tool");

    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolFailure::Spawn {
            command: command.clone(),
            source,
        })?;

    let output = tokio::select! {
        () = cancel.cancelled() => return Err(ToolFailure::Cancelled { command }),
        output = child.wait_with_output() => output.map_err(|source| ToolFailure::Spawn {
            command: command.clone(),
            source,
        })?,
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(combined)
    } else {
        Err(ToolFailure::Exit {
            command,
            status: output.status.to_string(),
            output: combined,
        })
    }
}

// ---------------------------------------------------------------------------
// DockerBuilder
// ---------------------------------------------------------------------------

/// Builds images with `docker build` and runs custom build commands in a shell.
#[derive(Debug, Clone)]
pub struct DockerBuilder {
    docker: String,
    shell: String,
}

impl DockerBuilder {
    pub fn new(tools: &ToolConfig) -> Self {
        Self {
            docker: tools.docker.clone(),
            shell: tools.shell.clone(),
        }
    }
}

#[async_trait]
impl ImageBuilder for DockerBuilder {
    async fn build(
        &self,
        context: &Path,
        image: &str,
        file: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        info!(image, "Building image");
        let mut cmd = Command::new(&self.docker);
        cmd.arg("build").arg(context).arg("-t").arg(image);
        if let Some(file) = file {
            cmd.arg("-f").arg(file);
        }
        run_tool(cmd, cancel).await.map(drop)
    }

    async fn run_shell(
        &self,
        command: &str,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command).current_dir(working_dir);
        run_tool(cmd, cancel).await.map(drop)
    }
}

// ---------------------------------------------------------------------------
// ForgeFlattener
// ---------------------------------------------------------------------------

/// Flattens deployment scripts with `forge`.
#[derive(Debug, Clone)]
pub struct ForgeFlattener {
    forge: String,
}

impl ForgeFlattener {
    pub fn new(tools: &ToolConfig) -> Self {
        Self {
            forge: tools.forge.clone(),
        }
    }
}

#[async_trait]
impl ScriptFlattener for ForgeFlattener {
    async fn install_deps(
        &self,
        contracts_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        let mut cmd = Command::new(&self.forge);
        cmd.arg("install").current_dir(contracts_dir);
        run_tool(cmd, cancel).await.map(drop)
    }

    async fn flatten(
        &self,
        contracts_dir: &Path,
        output: &Path,
        script: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        let mut cmd = Command::new(&self.forge);
        cmd.arg("flatten")
            .arg("-o")
            .arg(output)
            .arg(script)
            .current_dir(contracts_dir);
        run_tool(cmd, cancel).await.map(drop)
    }
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// Fetches remote static files with a plain HTTP GET.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
