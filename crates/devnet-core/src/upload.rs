//! Upload orchestration: staging local sources and static files into the enclave.
//!
//! Two upload families run against an existing enclave:
//! - local repos: each deployment backed by a local repo gets its script
//!   flattened into a scratch tree and uploaded as `<deployment>-script`
//! - static artifacts: each artifact made only of static files is assembled
//!   into a scratch directory and uploaded under the artifact's name
//!
//! Every upload owns a private `TempDir`, removed when the upload finishes on
//! any path. Relative paths are resolved against an explicit base directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use devnet_config::{
    Artifact, ArtifactFile, Deployment, DevnetConfig, Locator, BUILD_CONFIG_FILE,
};
use devnet_engine::{ArtifactId, Enclave};
use futures::future::try_join_all;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{FetchError, ToolFailure, UploadError};

/// Produces a single self-contained script from a contracts project.
#[async_trait]
pub trait ScriptFlattener: Send + Sync {
    /// Install the project's dependencies.
    async fn install_deps(
        &self,
        contracts_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ToolFailure>;

    /// Flatten `script` into `output`, running from `contracts_dir`.
    async fn flatten(
        &self,
        contracts_dir: &Path,
        output: &Path,
        script: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ToolFailure>;
}

/// Downloads remote static files.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// GET `url`; any status outside 2xx is [`FetchError::Status`].
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

fn scratch_dir(name: &str) -> Result<TempDir, UploadError> {
    tempfile::Builder::new()
        .prefix("avs-devnet-")
        .tempdir()
        .map_err(|source| UploadError::Scratch {
            name: name.to_string(),
            source,
        })
}

async fn create_parent(name: &str, path: &Path) -> Result<(), UploadError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| UploadError::Copy {
                name: name.to_string(),
                path: parent.to_path_buf(),
                source,
            })?;
    }
    Ok(())
}

async fn copy_file(name: &str, src: &Path, dst: &Path) -> Result<(), UploadError> {
    create_parent(name, dst).await?;
    tokio::fs::copy(src, dst)
        .await
        .map_err(|source| UploadError::Copy {
            name: name.to_string(),
            path: src.to_path_buf(),
            source,
        })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Local repos
// ---------------------------------------------------------------------------

/// Deployments backed by a local repo, with the repo resolved against `base_dir`.
pub fn local_repo_deployments<'a>(
    base_dir: &Path,
    config: &'a DevnetConfig,
) -> Result<Vec<(&'a Deployment, PathBuf)>, UploadError> {
    let mut selected = Vec::new();
    for deployment in &config.deployments {
        match deployment.repo_locator()? {
            Some(locator @ Locator::Local(_)) => {
                if let Some(path) = locator.resolve(base_dir) {
                    selected.push((deployment, path));
                }
            }
            Some(Locator::Remote(_)) | None => {}
        }
    }
    Ok(selected)
}

/// Flatten and upload the script of every deployment with a local repo.
#[instrument(skip_all, fields(enclave = enclave.name()))]
pub async fn upload_local_repos(
    base_dir: &Path,
    config: &DevnetConfig,
    enclave: &dyn Enclave,
    flattener: &dyn ScriptFlattener,
    cancel: &CancellationToken,
) -> Result<Vec<ArtifactId>, UploadError> {
    let deployments = local_repo_deployments(base_dir, config)?;
    if deployments.is_empty() {
        debug!("no local repos to upload");
        return Ok(Vec::new());
    }

    try_join_all(deployments.into_iter().map(|(deployment, repo_path)| async move {
        upload_local_repo(deployment, &repo_path, enclave, flattener, cancel).await
    }))
    .await
}

/// Upload a single deployment's flattened script and build config.
///
/// The scratch tree mirrors `<contracts_path>/<script dir>` and holds only
/// the flattened script plus a verbatim copy of the build config file.
pub async fn upload_local_repo(
    deployment: &Deployment,
    repo_path: &Path,
    enclave: &dyn Enclave,
    flattener: &dyn ScriptFlattener,
    cancel: &CancellationToken,
) -> Result<ArtifactId, UploadError> {
    let script = Path::new(deployment.script_path());
    let contracts_dir = repo_path.join(&deployment.contracts_path);
    let script_origin = contracts_dir.join(script);

    if !tokio::fs::try_exists(&script_origin).await.unwrap_or(false) {
        return Err(UploadError::ScriptNotFound {
            deployment: deployment.name.clone(),
            path: script_origin,
        });
    }

    let flatten_err = |failure: ToolFailure| UploadError::Flatten {
        deployment: deployment.name.clone(),
        repo: repo_path.to_path_buf(),
        failure,
    };

    let scratch = scratch_dir(&deployment.name)?;
    let contracts_out = scratch.path().join(&deployment.contracts_path);
    let script_destination = contracts_out.join(script);
    create_parent(&deployment.name, &script_destination).await?;

    info!(deployment = %deployment.name, repo = %repo_path.display(), "Flattening deployment script");
    flattener
        .install_deps(&contracts_dir, cancel)
        .await
        .map_err(flatten_err)?;
    flattener
        .flatten(&contracts_dir, &script_destination, &script_origin, cancel)
        .await
        .map_err(flatten_err)?;

    copy_file(
        &deployment.name,
        &contracts_dir.join(BUILD_CONFIG_FILE),
        &contracts_out.join(BUILD_CONFIG_FILE),
    )
    .await?;

    let artifact = deployment.script_artifact_name();
    let id = enclave
        .upload_files(scratch.path(), &artifact)
        .await
        .map_err(|source| UploadError::Upload {
            artifact: artifact.clone(),
            source,
        })?;
    info!(deployment = %deployment.name, artifact = %id, "Uploaded deployment script");
    Ok(id)
}

// ---------------------------------------------------------------------------
// Static artifacts
// ---------------------------------------------------------------------------

/// Assemble and upload every artifact made only of static files.
///
/// A mixed artifact anywhere in the config fails before any upload begins.
#[instrument(skip_all, fields(enclave = enclave.name()))]
pub async fn upload_static_artifacts(
    base_dir: &Path,
    config: &DevnetConfig,
    enclave: &dyn Enclave,
    fetcher: &dyn FileFetcher,
    cancel: &CancellationToken,
) -> Result<Vec<ArtifactId>, UploadError> {
    let artifacts = config.static_artifacts()?;
    if artifacts.is_empty() {
        debug!("no static artifacts to upload");
        return Ok(Vec::new());
    }

    try_join_all(artifacts.into_iter().map(|(name, artifact)| async move {
        upload_static_artifact(base_dir, name, artifact, enclave, fetcher, cancel).await
    }))
    .await
}

/// Stage one static artifact's files and upload them as `name`.
pub async fn upload_static_artifact(
    base_dir: &Path,
    name: &str,
    artifact: &Artifact,
    enclave: &dyn Enclave,
    fetcher: &dyn FileFetcher,
    cancel: &CancellationToken,
) -> Result<ArtifactId, UploadError> {
    let scratch = scratch_dir(name)?;

    for (file_name, file) in &artifact.files {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let ArtifactFile::Static(source) = file else {
            continue;
        };
        let destination = scratch.path().join(file_name);

        match Locator::parse(source)? {
            Locator::Local(path) => {
                let origin = devnet_config::ensure_abs(base_dir, &path);
                debug!(artifact = name, origin = %origin.display(), "copying static file");
                copy_file(name, &origin, &destination).await?;
            }
            Locator::Remote(url) => {
                debug!(artifact = name, %url, "fetching static file");
                let fetched = tokio::select! {
                    () = cancel.cancelled() => return Err(UploadError::Cancelled),
                    fetched = fetcher.fetch(&url) => fetched,
                };
                let body = fetched.map_err(|source| UploadError::Fetch {
                    artifact: name.to_string(),
                    url: url.clone(),
                    source,
                })?;
                create_parent(name, &destination).await?;
                tokio::fs::write(&destination, body)
                    .await
                    .map_err(|source| UploadError::Copy {
                        name: name.to_string(),
                        path: destination.clone(),
                        source,
                    })?;
            }
        }
    }

    let id = enclave
        .upload_files(scratch.path(), name)
        .await
        .map_err(|source| UploadError::Upload {
            artifact: name.to_string(),
            source,
        })?;
    info!(artifact = %id, "Uploaded static artifact");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"deployments:
  - name: local
    repo: ./avs
    contracts_path: contracts
    script: script/Deploy.s.sol:Deploy
  - name: remote
    repo: https://github.com/Layr-Labs/eigenlayer-contracts.git
  - name: prebuilt
"#;

    #[test]
    fn only_local_repos_are_selected() {
        let config = DevnetConfig::from_yaml(CONFIG).unwrap();
        let selected = local_repo_deployments(Path::new("/work"), &config).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0.name, "local");
        assert_eq!(selected[0].1, PathBuf::from("/work/./avs"));
    }

    #[test]
    fn invalid_repo_locator_is_a_config_error() {
        let config =
            DevnetConfig::from_yaml("deployments:\n  - name: bad\n    repo: git@host:org/repo\n")
                .unwrap();
        let err = local_repo_deployments(Path::new("/work"), &config).unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }
}
