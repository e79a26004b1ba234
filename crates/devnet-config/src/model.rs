//! Devnet configuration model.
//!
//! The model is intentionally non-exhaustive: only the keys this tool acts on
//! are decoded, everything else is ignored here and reaches the engine
//! untouched through the raw document kept in [`DevnetConfig`].

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::locator::Locator;

/// Separates a deployment script path from its target contract selector,
/// as in `script/Deploy.s.sol:Deploy`.
pub const SCRIPT_TARGET_DELIMITER: char = ':';

/// Build configuration file copied next to a flattened deployment script.
pub const BUILD_CONFIG_FILE: &str = "foundry.toml";

/// Parsed devnet configuration.
///
/// Immutable once loaded. [`DevnetConfig::to_yaml`] returns the exact bytes
/// it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct DevnetConfig {
    pub deployments: Vec<Deployment>,
    pub services: Vec<Service>,
    pub artifacts: BTreeMap<String, Artifact>,
    raw: String,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    deployments: Option<Vec<Deployment>>,
    #[serde(default)]
    services: Option<Vec<Service>>,
    #[serde(default)]
    artifacts: Option<BTreeMap<String, Artifact>>,
}

impl DevnetConfig {
    /// Read and parse a config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a config from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let parsed: RawConfig = serde_yaml::from_str(content)?;
        let config = DevnetConfig {
            deployments: parsed.deployments.unwrap_or_default(),
            services: parsed.services.unwrap_or_default(),
            artifacts: parsed.artifacts.unwrap_or_default(),
            raw: content.to_string(),
        };
        config.check_deployment_names()?;
        Ok(config)
    }

    /// Parse a config from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let content = std::str::from_utf8(bytes).map_err(|e| {
            ConfigError::Yaml(serde::de::Error::custom(format!(
                "config is not valid UTF-8: {e}"
            )))
        })?;
        Self::from_yaml(content)
    }

    /// Serialized form handed to the engine. Byte-identical to the input.
    pub fn to_yaml(&self) -> &str {
        &self.raw
    }

    /// Same as [`DevnetConfig::to_yaml`], as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.raw.as_bytes()
    }

    /// Services that need a local image build.
    pub fn buildable_services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter().filter(|s| s.build.is_some())
    }

    /// Artifacts whose files must be staged and uploaded.
    ///
    /// Every artifact is checked before anything is returned, so a mixed
    /// artifact anywhere fails the whole call. Template-only and empty
    /// artifacts are left to the engine and not returned.
    pub fn static_artifacts(&self) -> Result<Vec<(&str, &Artifact)>> {
        let mut selected = Vec::new();
        for (name, artifact) in &self.artifacts {
            match artifact.kind() {
                ArtifactKind::Mixed => {
                    return Err(ConfigError::MixedArtifact {
                        artifact: name.clone(),
                    })
                }
                ArtifactKind::Static => selected.push((name.as_str(), artifact)),
                ArtifactKind::TemplatesOnly | ArtifactKind::Empty => {}
            }
        }
        Ok(selected)
    }

    fn check_deployment_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for deployment in &self.deployments {
            if deployment.name.is_empty() {
                continue;
            }
            if !seen.insert(deployment.name.as_str()) {
                return Err(ConfigError::DuplicateDeployment(deployment.name.clone()));
            }
        }
        Ok(())
    }
}

/// A named group of contracts to make available inside the enclave.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub name: String,
    /// Repo containing the contracts; may be a local path.
    #[serde(default)]
    pub repo: String,
    /// Git ref to check out.
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    /// Path of the contracts project inside the repo.
    #[serde(default)]
    pub contracts_path: String,
    /// Deployment script, relative to the contracts project.
    #[serde(default)]
    pub script: String,
}

impl Deployment {
    /// Script path without its trailing target selector.
    ///
    /// `"script/Deploy.s.sol:Deploy"` -> `"script/Deploy.s.sol"`
    pub fn script_path(&self) -> &str {
        match self.script.split_once(SCRIPT_TARGET_DELIMITER) {
            Some((path, _target)) => path,
            None => &self.script,
        }
    }

    /// Parsed repo locator, or `None` when no repo is set.
    pub fn repo_locator(&self) -> Result<Option<Locator>> {
        if self.repo.is_empty() {
            return Ok(None);
        }
        Locator::parse(&self.repo).map(Some)
    }

    /// Name of the artifact holding this deployment's flattened script.
    pub fn script_artifact_name(&self) -> String {
        format!("{}-script", self.name)
    }
}

/// A container service that runs inside the devnet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawService")]
pub struct Service {
    pub name: String,
    pub image: String,
    /// How to build `image` locally. `None` means the image already exists.
    pub build: Option<BuildStrategy>,
}

/// How a service image is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStrategy {
    /// `docker build <context> [-f <file>]`
    Context {
        context: PathBuf,
        file: Option<PathBuf>,
    },
    /// Arbitrary shell command run from the config's directory.
    Command(String),
}

#[derive(Deserialize)]
struct RawService {
    #[serde(default)]
    name: String,
    image: String,
    #[serde(default)]
    build_context: Option<PathBuf>,
    #[serde(default)]
    build_file: Option<PathBuf>,
    #[serde(default)]
    build_cmd: Option<String>,
}

impl TryFrom<RawService> for Service {
    type Error = ConfigError;

    fn try_from(raw: RawService) -> Result<Self> {
        let service_label = if raw.name.is_empty() {
            raw.image.clone()
        } else {
            raw.name.clone()
        };

        let build = match (raw.build_context, raw.build_file, raw.build_cmd) {
            (Some(_), _, Some(_)) => {
                return Err(ConfigError::ConflictingBuildStrategy {
                    service: service_label,
                })
            }
            (None, Some(_), _) => {
                return Err(ConfigError::BuildFileWithoutContext {
                    service: service_label,
                })
            }
            (Some(context), file, None) => Some(BuildStrategy::Context { context, file }),
            (None, None, Some(cmd)) => Some(BuildStrategy::Command(cmd)),
            (None, None, None) => None,
        };

        Ok(Service {
            name: raw.name,
            image: raw.image,
            build,
        })
    }
}

/// A named bundle of files made available inside the enclave.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Artifact {
    /// Output file name -> file source
    #[serde(default)]
    pub files: BTreeMap<String, ArtifactFile>,
}

/// What an artifact contains, as far as uploading is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Empty,
    Static,
    TemplatesOnly,
    Mixed,
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        let statics = self.files.values().filter(|f| f.is_static()).count();
        let templates = self.files.len() - statics;
        match (statics, templates) {
            (0, 0) => ArtifactKind::Empty,
            (_, 0) => ArtifactKind::Static,
            (0, _) => ArtifactKind::TemplatesOnly,
            _ => ArtifactKind::Mixed,
        }
    }
}

/// Source of a single artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawArtifactFile")]
pub enum ArtifactFile {
    /// Local path or remote URL copied as-is.
    Static(String),
    /// Template body rendered by the engine.
    Template(String),
}

impl ArtifactFile {
    pub fn is_static(&self) -> bool {
        matches!(self, ArtifactFile::Static(_))
    }
}

#[derive(Deserialize)]
struct RawArtifactFile {
    #[serde(default)]
    static_file: Option<String>,
    #[serde(default)]
    template: Option<String>,
}

impl TryFrom<RawArtifactFile> for ArtifactFile {
    type Error = ConfigError;

    fn try_from(raw: RawArtifactFile) -> Result<Self> {
        match (raw.static_file, raw.template) {
            (Some(source), None) => Ok(ArtifactFile::Static(source)),
            (None, Some(body)) => Ok(ArtifactFile::Template(body)),
            _ => Err(ConfigError::AmbiguousArtifactFile),
        }
    }
}
