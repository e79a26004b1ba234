//! In-memory engine fakes (testing only)
//!
//! `MemoryEngine` keeps enclaves in a `HashMap`. Each `MemoryEnclave`
//! snapshots uploaded directories so tests can inspect them after the
//! uploader's scratch space is gone, and replays a scripted event list for
//! every package run.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{ArtifactId, Enclave, Engine, PackageLocator};
use crate::error::{EngineError, Result};
use crate::events::ProgressEvent;

/// Files of one artifact, keyed by path relative to the uploaded directory.
pub type ArtifactFiles = BTreeMap<PathBuf, Vec<u8>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryEngine
// ---------------------------------------------------------------------------

/// In-memory engine backed by a `HashMap<name, enclave>`.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    enclaves: Mutex<HashMap<String, Arc<MemoryEnclave>>>,
    run_events: Mutex<Vec<ProgressEvent>>,
    destroyed: Mutex<Vec<String>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events replayed by every package run in enclaves created afterwards.
    pub fn with_run_events(events: Vec<ProgressEvent>) -> Self {
        let engine = Self::default();
        *lock(&engine.run_events) = events;
        engine
    }

    /// Register an already-running enclave.
    pub fn insert_enclave(&self, name: &str) -> Arc<MemoryEnclave> {
        let enclave = Arc::new(MemoryEnclave::new(name, lock(&self.run_events).clone()));
        lock(&self.enclaves).insert(name.to_string(), Arc::clone(&enclave));
        enclave
    }

    /// Concrete handle to an enclave, for inspection.
    pub fn enclave(&self, name: &str) -> Option<Arc<MemoryEnclave>> {
        lock(&self.enclaves).get(name).cloned()
    }

    /// Names of all live enclaves, sorted.
    pub fn enclave_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.enclaves).keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of destroyed enclaves, in order.
    pub fn destroyed(&self) -> Vec<String> {
        lock(&self.destroyed).clone()
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn enclave_exists(&self, name: &str) -> Result<bool> {
        Ok(lock(&self.enclaves).contains_key(name))
    }

    async fn create_enclave(&self, name: &str) -> Result<Arc<dyn Enclave>> {
        let mut enclaves = lock(&self.enclaves);
        if enclaves.contains_key(name) {
            return Err(EngineError::EnclaveAlreadyExists(name.to_string()));
        }
        let enclave = Arc::new(MemoryEnclave::new(name, lock(&self.run_events).clone()));
        enclaves.insert(name.to_string(), Arc::clone(&enclave));
        Ok(enclave)
    }

    async fn get_enclave(&self, name: &str) -> Result<Arc<dyn Enclave>> {
        let enclave = lock(&self.enclaves)
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::EnclaveNotFound(name.to_string()))?;
        Ok(enclave)
    }

    async fn destroy_enclave(&self, name: &str) -> Result<()> {
        lock(&self.enclaves)
            .remove(name)
            .ok_or_else(|| EngineError::EnclaveNotFound(name.to_string()))?;
        lock(&self.destroyed).push(name.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryEnclave
// ---------------------------------------------------------------------------

/// A package run recorded by [`MemoryEnclave`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub package: PackageLocator,
    pub params: String,
}

/// In-memory enclave.
#[derive(Debug)]
pub struct MemoryEnclave {
    name: String,
    artifacts: Mutex<BTreeMap<String, ArtifactFiles>>,
    runs: Mutex<Vec<RecordedRun>>,
    run_events: Vec<ProgressEvent>,
}

impl MemoryEnclave {
    fn new(name: &str, run_events: Vec<ProgressEvent>) -> Self {
        Self {
            name: name.to_string(),
            artifacts: Mutex::new(BTreeMap::new()),
            runs: Mutex::new(Vec::new()),
            run_events,
        }
    }

    /// Store an artifact directly, as if a package run had produced it.
    pub fn seed_artifact(&self, artifact: &str, files: ArtifactFiles) {
        lock(&self.artifacts).insert(artifact.to_string(), files);
    }

    /// Snapshot of an uploaded artifact.
    pub fn artifact(&self, artifact: &str) -> Option<ArtifactFiles> {
        lock(&self.artifacts).get(artifact).cloned()
    }

    /// Names of all artifacts, sorted.
    pub fn artifact_names(&self) -> Vec<String> {
        lock(&self.artifacts).keys().cloned().collect()
    }

    /// Package runs started so far.
    pub fn runs(&self) -> Vec<RecordedRun> {
        lock(&self.runs).clone()
    }
}

#[async_trait]
impl Enclave for MemoryEnclave {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload_files(&self, dir: &Path, artifact: &str) -> Result<ArtifactId> {
        let mut files = ArtifactFiles::new();
        snapshot_dir(dir, dir, &mut files)?;

        let mut artifacts = lock(&self.artifacts);
        if artifacts.contains_key(artifact) {
            return Err(EngineError::CommandFailed {
                command: format!("upload {artifact}"),
                output: format!("files artifact '{artifact}' already exists"),
            });
        }
        artifacts.insert(artifact.to_string(), files);
        Ok(ArtifactId::new(artifact))
    }

    async fn download_files(&self, artifact: &str, dest: &Path) -> Result<()> {
        let files = self
            .artifact(artifact)
            .ok_or_else(|| EngineError::CommandFailed {
                command: format!("download {artifact}"),
                output: format!("files artifact '{artifact}' not found"),
            })?;
        for (relative, contents) in files {
            let path = dest.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    async fn run_package(
        &self,
        package: &PackageLocator,
        params: &str,
        _cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ProgressEvent>> {
        lock(&self.runs).push(RecordedRun {
            package: package.clone(),
            params: params.to_string(),
        });

        let (tx, rx) = mpsc::channel(self.run_events.len().max(1));
        for event in &self.run_events {
            // capacity covers every scripted event
            tx.try_send(event.clone())
                .map_err(|e| EngineError::Decode(e.to_string()))?;
        }
        Ok(rx)
    }
}

fn snapshot_dir(root: &Path, dir: &Path, files: &mut ArtifactFiles) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            snapshot_dir(root, &path, files)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            files.insert(relative, std::fs::read(&path)?);
        }
    }
    Ok(())
}
