//! Devnet naming and the starter configuration written by `init`.

use std::path::Path;

use regex::Regex;

use crate::error::{ConfigError, Result};

/// Config file used when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "devnet.yaml";

/// Devnet name used together with [`DEFAULT_CONFIG_FILE`].
pub const DEFAULT_DEVNET_NAME: &str = "devnet";

const DEVNET_NAME_PATTERN: &str = "^[-A-Za-z0-9]{1,60}$";

/// Derive the devnet (enclave) name from a config file path.
///
/// Takes the file name up to its first `.`, replaces `_` with `-` and
/// checks the result is a valid enclave name.
///
/// `"configs/hello_world.yaml"` -> `"hello-world"`
pub fn devnet_name_from_path(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();
    let name = stem.replace('_', "-");

    if is_valid_devnet_name(&name) {
        Ok(name)
    } else {
        Err(ConfigError::InvalidDevnetName(name))
    }
}

/// Whether `name` can be used as an enclave name.
pub fn is_valid_devnet_name(name: &str) -> bool {
    Regex::new(DEVNET_NAME_PATTERN)
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// Starter configuration written by `init`.
pub const DEFAULT_CONFIG: &str = r#"deployments:
  # Deploy EigenLayer
  - type: EigenLayer
    ref: v0.4.2-mainnet-pepe
    # Whitelist a single strategy named MockETH, backed by a mock-token
    strategies: [MockETH]
    operators:
      # Register a single operator with EigenLayer
      - name: operator1
        keys: operator1_ecdsa
        # Deposit 1e17 tokens into the MockETH strategy
        strategies:
          MockETH: 100000000000000000

# Specify keys to generate
keys:
  - name: operator1_ecdsa
    type: ecdsa
  - name: operator1_bls
    type: bls

# ethereum-package configuration
ethereum_package:
  participants:
    - el_type: erigon
  additional_services:
    - blockscout
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DevnetConfig;

    #[test]
    fn name_from_simple_file() {
        let name = devnet_name_from_path(Path::new("devnet.yaml")).unwrap();
        assert_eq!(name, "devnet");
    }

    #[test]
    fn name_replaces_underscores_and_drops_extensions() {
        let name = devnet_name_from_path(Path::new("configs/hello_world.local.yaml")).unwrap();
        assert_eq!(name, "hello-world");
    }

    #[test]
    fn invalid_name_is_rejected() {
        let err = devnet_name_from_path(Path::new("my devnet!.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDevnetName(_)));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(devnet_name_from_path(Path::new(".yaml")).is_err());
    }

    #[test]
    fn overlong_name_is_rejected() {
        let long = "a".repeat(61);
        assert!(!is_valid_devnet_name(&long));
        assert!(is_valid_devnet_name(&"a".repeat(60)));
    }

    #[test]
    fn default_config_parses() {
        let config = DevnetConfig::from_yaml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.deployments.len(), 1);
        assert_eq!(config.deployments[0].git_ref, "v0.4.2-mainnet-pepe");
        assert!(config.services.is_empty());
        assert_eq!(config.to_yaml(), DEFAULT_CONFIG);
    }
}
