//! Engine backed by the `kurtosis` command-line tool.
//!
//! Lifecycle and artifact operations are one-shot invocations. A package run
//! is a long-lived child process whose stdout is read line by line: lines
//! holding a JSON response line are decoded into [`ProgressEvent`]s, anything
//! else is forwarded as an info message.
//!
//! The stock `kurtosis run` prints human-readable text, so against it the
//! event stream is mostly [`ProgressEvent::Info`] lines followed by the
//! `RunFinished` synthesized from the exit status. Phase and step events
//! only appear when the program emits response lines as JSON.

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::engine::{ArtifactId, Enclave, Engine, PackageLocator, EVENT_CHANNEL_CAPACITY};
use crate::error::{EngineError, Result};
use crate::events::ProgressEvent;

/// Program name used when no override is configured.
pub const DEFAULT_KURTOSIS_PROGRAM: &str = "kurtosis";

/// Engine implementation shelling out to `kurtosis`.
///
/// Package runs usually surface as info lines and a final `RunFinished`;
/// do not rely on interpretation, validation or execution callbacks from it.
#[derive(Debug, Clone)]
pub struct KurtosisCli {
    program: Arc<OsString>,
}

impl KurtosisCli {
    /// Wrap `program` without contacting the engine.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: Arc::new(program.into()),
        }
    }

    /// Wrap `program` and make sure the engine is running, starting it if needed.
    pub async fn connect(program: impl Into<OsString>) -> Result<Self> {
        let cli = Self::new(program);
        cli.ensure_engine().await?;
        Ok(cli)
    }

    async fn ensure_engine(&self) -> Result<()> {
        let status = output(&self.program, &["engine", "status"]).await;
        match status {
            Ok((status, _)) if status.success() => return Ok(()),
            Ok(_) => {}
            Err(EngineError::Io(err)) => {
                return Err(EngineError::EngineUnavailable(format!(
                    "failed to execute {}: {err}",
                    self.program.to_string_lossy()
                )))
            }
            Err(err) => return Err(err),
        }

        info!("Starting Kurtosis engine");
        let (status, out) = output(&self.program, &["engine", "start"]).await?;
        if !status.success() {
            return Err(EngineError::EngineUnavailable(out));
        }
        Ok(())
    }

    fn enclave(&self, name: &str) -> Arc<dyn Enclave> {
        Arc::new(KurtosisEnclave {
            program: Arc::clone(&self.program),
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl Engine for KurtosisCli {
    async fn enclave_exists(&self, name: &str) -> Result<bool> {
        let (status, _) = output(&self.program, &["enclave", "inspect", name]).await?;
        Ok(status.success())
    }

    #[instrument(skip(self))]
    async fn create_enclave(&self, name: &str) -> Result<Arc<dyn Enclave>> {
        if self.enclave_exists(name).await? {
            return Err(EngineError::EnclaveAlreadyExists(name.to_string()));
        }
        checked(&self.program, &["enclave", "add", "--name", name]).await?;
        Ok(self.enclave(name))
    }

    async fn get_enclave(&self, name: &str) -> Result<Arc<dyn Enclave>> {
        if !self.enclave_exists(name).await? {
            return Err(EngineError::EnclaveNotFound(name.to_string()));
        }
        Ok(self.enclave(name))
    }

    #[instrument(skip(self))]
    async fn destroy_enclave(&self, name: &str) -> Result<()> {
        if !self.enclave_exists(name).await? {
            return Err(EngineError::EnclaveNotFound(name.to_string()));
        }
        checked(&self.program, &["enclave", "rm", "--force", name]).await?;
        Ok(())
    }
}

/// Enclave handle for [`KurtosisCli`].
#[derive(Debug)]
struct KurtosisEnclave {
    program: Arc<OsString>,
    name: String,
}

#[async_trait]
impl Enclave for KurtosisEnclave {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(enclave = %self.name))]
    async fn upload_files(&self, dir: &Path, artifact: &str) -> Result<ArtifactId> {
        let args: [&OsStr; 6] = [
            "files".as_ref(),
            "upload".as_ref(),
            "--name".as_ref(),
            artifact.as_ref(),
            self.name.as_ref(),
            dir.as_os_str(),
        ];
        checked(&self.program, &args).await?;
        Ok(ArtifactId::new(artifact))
    }

    #[instrument(skip(self), fields(enclave = %self.name))]
    async fn download_files(&self, artifact: &str, dest: &Path) -> Result<()> {
        let args: [&OsStr; 5] = [
            "files".as_ref(),
            "download".as_ref(),
            self.name.as_ref(),
            artifact.as_ref(),
            dest.as_os_str(),
        ];
        checked(&self.program, &args).await?;
        Ok(())
    }

    #[instrument(skip(self, package, params, cancel), fields(enclave = %self.name, package = %package))]
    async fn run_package(
        &self,
        package: &PackageLocator,
        params: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ProgressEvent>> {
        let mut args_file = tempfile::Builder::new()
            .prefix("devnet-args-")
            .suffix(".yaml")
            .tempfile()?;
        args_file.write_all(params.as_bytes())?;
        args_file.flush()?;

        let package_arg: OsString = match package {
            PackageLocator::Remote(url) => url.into(),
            PackageLocator::Local(path) => path.as_os_str().to_owned(),
        };

        let child = Command::new(self.program.as_os_str())
            .arg("run")
            .arg("--enclave")
            .arg(&self.name)
            .arg("--args-file")
            .arg(args_file.path())
            .arg(&package_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            // keep the args file alive until the run is over
            let _args_file = args_file;
            if let Err(err) = pump_run(child, tx, cancel).await {
                warn!(error = %err, "package run stream ended abnormally");
            }
        });
        Ok(rx)
    }
}

/// Forward the child's stdout as events until it exits or `cancel` fires.
async fn pump_run(
    mut child: Child,
    tx: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::EngineUnavailable("run stdout not captured".to_string()))?;
    let stderr = child.stderr.take();

    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut stderr) = stderr {
            stderr.read_to_string(&mut buf).await.ok();
        }
        buf
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut finished = false;

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => {
                warn!("package run cancelled");
                child.kill().await.ok();
                return Err(EngineError::Cancelled);
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        let Some(event) = decode_output_line(&line) else {
            continue;
        };
        finished |= matches!(event, ProgressEvent::RunFinished { .. });
        if tx.send(event).await.is_err() {
            debug!("event receiver dropped, stopping run");
            child.kill().await.ok();
            return Ok(());
        }
    }

    let status = child.wait().await?;
    let stderr = stderr_task.await.unwrap_or_default();

    if !finished {
        let event = ProgressEvent::RunFinished {
            success: status.success(),
            output: stderr.trim().to_string(),
        };
        tx.send(event).await.ok();
    }
    Ok(())
}

/// Turn one stdout line into an event. Blank lines yield nothing.
pub fn decode_output_line(line: &str) -> Option<ProgressEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        match ProgressEvent::from_json_line(trimmed) {
            Ok(event) => return Some(event),
            Err(err) => debug!(error = %err, "forwarding undecodable line as info"),
        }
    }
    Some(ProgressEvent::Info(trimmed.to_string()))
}

/// Run the program to completion, returning its status and combined output.
async fn output<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> Result<(ExitStatus, String)> {
    let out = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&out.stderr));
    Ok((out.status, combined))
}

/// Like [`output`], but a non-zero exit is an error.
async fn checked<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> Result<String> {
    let (status, out) = output(program, args).await?;
    if status.success() {
        return Ok(out);
    }
    let command = std::iter::once(program)
        .chain(args.iter().map(|a| a.as_ref()))
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    Err(EngineError::CommandFailed {
        command,
        output: out.trim().to_string(),
    })
}
