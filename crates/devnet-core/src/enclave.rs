//! Enclave lifecycle: existence checks, creation and destruction by devnet name.

use std::sync::Arc;

use devnet_engine::{Enclave, Engine, EngineError};
use tracing::{info, instrument};

use crate::error::{DevnetError, Result};

/// Lifecycle operations over an engine, with named errors for the cases
/// callers render specially.
#[derive(Clone)]
pub struct EnclaveManager {
    engine: Arc<dyn Engine>,
}

impl EnclaveManager {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.engine.enclave_exists(name).await?)
    }

    /// Create the enclave, failing with `AlreadyRunning` if it exists.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str) -> Result<Arc<dyn Enclave>> {
        if self.exists(name).await? {
            return Err(DevnetError::AlreadyRunning(name.to_string()));
        }
        let enclave = self
            .engine
            .create_enclave(name)
            .await
            .map_err(lifecycle_error)?;
        info!("Enclave created");
        Ok(enclave)
    }

    /// Handle to a running enclave, or `EnclaveNotFound`.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Enclave>> {
        self.engine.get_enclave(name).await.map_err(lifecycle_error)
    }

    /// Destroy the enclave, failing with `EnclaveNotFound` if it doesn't exist.
    #[instrument(skip(self))]
    pub async fn destroy(&self, name: &str) -> Result<()> {
        if !self.exists(name).await? {
            return Err(DevnetError::EnclaveNotFound(name.to_string()));
        }
        self.engine
            .destroy_enclave(name)
            .await
            .map_err(lifecycle_error)?;
        info!("Enclave destroyed");
        Ok(())
    }
}

fn lifecycle_error(err: EngineError) -> DevnetError {
    match err {
        EngineError::EnclaveNotFound(name) => DevnetError::EnclaveNotFound(name),
        EngineError::EnclaveAlreadyExists(name) => DevnetError::AlreadyRunning(name),
        other => DevnetError::Engine(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devnet_engine::fakes::MemoryEngine;

    #[tokio::test]
    async fn create_then_destroy() {
        let engine = Arc::new(MemoryEngine::new());
        let manager = EnclaveManager::new(engine.clone());

        manager.create("devnet").await.unwrap();
        assert!(manager.exists("devnet").await.unwrap());
        manager.destroy("devnet").await.unwrap();
        assert!(!manager.exists("devnet").await.unwrap());
        assert_eq!(engine.destroyed(), vec!["devnet".to_string()]);
    }

    #[tokio::test]
    async fn create_existing_is_already_running() {
        let engine = Arc::new(MemoryEngine::new());
        engine.insert_enclave("devnet");
        let err = EnclaveManager::new(engine)
            .create("devnet")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DevnetError::AlreadyRunning(name) if name == "devnet"));
    }

    #[tokio::test]
    async fn missing_enclave_is_named() {
        let manager = EnclaveManager::new(Arc::new(MemoryEngine::new()));
        let err = manager.destroy("ghost").await.unwrap_err();
        assert!(matches!(err, DevnetError::EnclaveNotFound(_)));
        let err = manager.get("ghost").await.err().unwrap();
        assert!(matches!(err, DevnetError::EnclaveNotFound(_)));
    }
}
