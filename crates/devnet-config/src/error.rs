//! Error types for devnet-config

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading or interpreting a devnet configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed YAML or a field of the wrong shape
    #[error("invalid devnet config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Devnet name derived from a file name is not a valid enclave name
    #[error("invalid devnet name: {0}")]
    InvalidDevnetName(String),

    /// An artifact declares both static files and templates
    #[error("artifact '{artifact}' mixes static files and templates, which is not supported")]
    MixedArtifact { artifact: String },

    /// An artifact file declares neither or both of `static_file` / `template`
    #[error("artifact file must declare exactly one of `static_file` or `template`")]
    AmbiguousArtifactFile,

    /// A service declares both a build context and a build command
    #[error("service '{service}' declares both `build_context` and `build_cmd`")]
    ConflictingBuildStrategy { service: String },

    /// A service declares a build file without a build context
    #[error("service '{service}' declares `build_file` without `build_context`")]
    BuildFileWithoutContext { service: String },

    /// Two deployments share the same name
    #[error("duplicate deployment name: {0}")]
    DuplicateDeployment(String),

    /// A repo or static file locator could not be parsed
    #[error("locator '{locator}' is invalid: {reason}")]
    InvalidLocator { locator: String, reason: String },
}

/// Result type for config operations
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_artifact_names_the_artifact() {
        let err = ConfigError::MixedArtifact {
            artifact: "genesis".to_string(),
        };
        assert!(err.to_string().contains("'genesis'"));
    }

    #[test]
    fn invalid_locator_carries_reason() {
        let err = ConfigError::InvalidLocator {
            locator: "git@github.com:org/repo".to_string(),
            reason: "scp-style locators are not supported".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("git@github.com:org/repo"));
        assert!(msg.contains("scp-style"));
    }
}
