//! Devnet-Config: the declarative devnet description
//!
//! Typed, read-only view over a devnet YAML file: contract deployments,
//! container services and the artifacts uploaded into the enclave. The raw
//! document is retained so it can be handed to the engine unchanged.
//!
//! ## Key Components
//!
//! - `DevnetConfig`: parsed config plus its raw serialized form
//! - `Deployment`, `Service`, `Artifact`: the parts this tool acts on
//! - `Locator`: local path vs remote URL for repos and static files

mod error;
mod locator;
mod model;
mod naming;

pub use error::{ConfigError, Result};
pub use locator::{ensure_abs, Locator};
pub use model::{
    Artifact, ArtifactFile, ArtifactKind, BuildStrategy, Deployment, DevnetConfig, Service,
    BUILD_CONFIG_FILE, SCRIPT_TARGET_DELIMITER,
};
pub use naming::{
    devnet_name_from_path, is_valid_devnet_name, DEFAULT_CONFIG, DEFAULT_CONFIG_FILE,
    DEFAULT_DEVNET_NAME,
};
