//! Devnet-Core: build/upload orchestration and run progress
//!
//! Drives a devnet from config to running enclave: builds local service
//! images, stages local deployment scripts and static files into the
//! enclave, runs the devnet package and turns its event stream into
//! progress callbacks.
//!
//! ## Key Components
//!
//! - `build`: bounded-parallel image builds with aggregated failures
//! - `upload`: local repo and static artifact uploads
//! - `progress`: the run event interpreter and its `Reporter` sink
//! - `devnet`: the `init`, `start` and `stop` flows
//! - `addresses`: contract address lookup in run artifacts

pub mod addresses;
pub mod build;
pub mod devnet;
pub mod enclave;
pub mod error;
pub mod progress;
pub mod reporter;
pub mod telemetry;
pub mod tooling;
pub mod upload;

pub use addresses::{get_addresses, lookup, render, AddressAnswer, AddressQuery};
pub use build::{build_images, plan_builds, BuildJob, ImageBuilder};
pub use devnet::{init, start, stop, StartOptions, Toolchain};
pub use enclave::EnclaveManager;
pub use error::{
    BuildError, DevnetError, FetchError, ImageBuildFailure, ProgressError, Result, ToolFailure,
    UploadError,
};
pub use progress::{
    report_progress, ExecutionStep, Flow, Phase, ProgressInterpreter, RunOutcome, ValidationStep,
};
pub use reporter::{LogReporter, ProgressBarReporter, Reporter, SilentReporter};
pub use telemetry::init_tracing;
pub use tooling::{
    run_tool, DockerBuilder, ForgeFlattener, HttpFetcher, ToolConfig, DEFAULT_MAX_PARALLEL_BUILDS,
};
pub use upload::{
    local_repo_deployments, upload_local_repos, upload_static_artifacts, FileFetcher,
    ScriptFlattener,
};
