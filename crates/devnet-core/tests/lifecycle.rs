//! Start/stop flows end to end against the in-memory engine.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use devnet_config::DevnetConfig;
use devnet_core::{
    get_addresses, start, stop, DevnetError, FetchError, FileFetcher, ImageBuilder,
    ProgressError, ScriptFlattener, SilentReporter, StartOptions, ToolFailure, Toolchain,
};
use devnet_engine::fakes::{ArtifactFiles, MemoryEngine};
use devnet_engine::{EngineFault, FaultKind, PackageLocator, ProgressEvent, ProgressInfo};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct StubBuilder {
    builds: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ImageBuilder for StubBuilder {
    async fn build(
        &self,
        _context: &Path,
        image: &str,
        _file: Option<&Path>,
        _cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ToolFailure::Exit {
                command: format!("docker build -t {image}"),
                status: "exit status: 1".to_string(),
                output: "no Dockerfile".to_string(),
            });
        }
        Ok(())
    }

    async fn run_shell(
        &self,
        _command: &str,
        _working_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        Ok(())
    }
}

struct NoFlattener;

#[async_trait]
impl ScriptFlattener for NoFlattener {
    async fn install_deps(
        &self,
        _contracts_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        Ok(())
    }

    async fn flatten(
        &self,
        _contracts_dir: &Path,
        _output: &Path,
        _script: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        Ok(())
    }
}

struct NoFetcher;

#[async_trait]
impl FileFetcher for NoFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Status(404))
    }
}

const CONFIG: &str = r#"services:
  - name: app
    image: app:latest
    build_context: ./app
  - name: anvil
    image: ghcr.io/foundry-rs/foundry:latest
"#;

fn toolchain(builder: Arc<StubBuilder>) -> Toolchain {
    Toolchain {
        builder,
        flattener: Arc::new(NoFlattener),
        fetcher: Arc::new(NoFetcher),
        max_parallel_builds: 2,
    }
}

fn options(base_dir: &Path) -> StartOptions {
    StartOptions {
        devnet_name: "devnet".to_string(),
        base_dir: base_dir.to_path_buf(),
        config: DevnetConfig::from_yaml(CONFIG).unwrap(),
        package: PackageLocator::default(),
    }
}

fn successful_run() -> Vec<ProgressEvent> {
    vec![
        ProgressEvent::ProgressInfo(ProgressInfo {
            step_info: vec!["Starting execution".to_string()],
            total_steps: 1,
            current_step: 0,
        }),
        ProgressEvent::Instruction {
            description: "add_service(name=\"app\")".to_string(),
        },
        ProgressEvent::RunFinished {
            success: true,
            output: "{}".to_string(),
        },
    ]
}

#[tokio::test]
async fn start_builds_creates_and_runs_with_raw_config() {
    let base = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::with_run_events(successful_run()));
    let builder = Arc::new(StubBuilder::default());

    start(
        engine.clone(),
        &options(base.path()),
        &toolchain(builder.clone()),
        &mut SilentReporter,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    let enclave = engine.enclave("devnet").unwrap();
    let runs = enclave.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].params, CONFIG);
    assert_eq!(runs[0].package, PackageLocator::default());
}

#[tokio::test]
async fn start_on_running_devnet_is_rejected() {
    let base = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::with_run_events(successful_run()));
    engine.insert_enclave("devnet");
    let builder = Arc::new(StubBuilder::default());

    let err = start(
        engine,
        &options(base.path()),
        &toolchain(builder.clone()),
        &mut SilentReporter,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DevnetError::AlreadyRunning(name) if name == "devnet"));
    assert_eq!(builder.builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_build_leaves_no_enclave() {
    let base = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::with_run_events(successful_run()));
    let builder = Arc::new(StubBuilder {
        fail: true,
        ..StubBuilder::default()
    });

    let err = start(
        engine.clone(),
        &options(base.path()),
        &toolchain(builder),
        &mut SilentReporter,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    match err {
        DevnetError::Build(build) => assert_eq!(build.images(), vec!["app:latest"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.enclave_names().is_empty());
}

#[tokio::test]
async fn failed_run_surfaces_output() {
    let base = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::with_run_events(vec![
        ProgressEvent::RunFinished {
            success: false,
            output: "deployer reverted".to_string(),
        },
    ]));

    let err = start(
        engine,
        &options(base.path()),
        &toolchain(Arc::new(StubBuilder::default())),
        &mut SilentReporter,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DevnetError::RunFailed { output } if output == "deployer reverted"));
}

#[tokio::test]
async fn engine_error_event_fails_start() {
    let base = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::with_run_events(vec![ProgressEvent::Error(
        EngineFault {
            kind: FaultKind::Interpretation,
            message: "bad param".to_string(),
        },
    )]));

    let err = start(
        engine,
        &options(base.path()),
        &toolchain(Arc::new(StubBuilder::default())),
        &mut SilentReporter,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        DevnetError::Progress(ProgressError::Engine {
            kind: FaultKind::Interpretation,
            ..
        })
    ));
}

#[tokio::test]
async fn stream_without_finish_is_incomplete() {
    let base = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::with_run_events(vec![]));

    let err = start(
        engine,
        &options(base.path()),
        &toolchain(Arc::new(StubBuilder::default())),
        &mut SilentReporter,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DevnetError::RunIncomplete));
}

#[tokio::test]
async fn stop_missing_devnet_is_not_found() {
    let engine = Arc::new(MemoryEngine::new());
    let err = stop(engine, "ghost").await.unwrap_err();
    assert!(matches!(err, DevnetError::EnclaveNotFound(name) if name == "ghost"));
}

#[tokio::test]
async fn stop_destroys_running_devnet() {
    let engine = Arc::new(MemoryEngine::new());
    engine.insert_enclave("devnet");
    stop(engine.clone(), "devnet").await.unwrap();
    assert_eq!(engine.destroyed(), vec!["devnet".to_string()]);
    assert!(engine.enclave_names().is_empty());
}

#[tokio::test]
async fn addresses_are_read_from_run_artifacts() {
    let engine = Arc::new(MemoryEngine::new());
    let enclave = engine.insert_enclave("devnet");
    let mut files = ArtifactFiles::new();
    files.insert(
        "deployment_output.json".into(),
        br#"{"addresses":{"registryCoordinator":"0x42","nested":{"x":"0x7"}}}"#.to_vec(),
    );
    enclave.seed_artifact("hello_world", files);

    let queries = vec![
        "hello_world:registryCoordinator".to_string(),
        "hello_world:.nested.x".to_string(),
        "hello_world:missing".to_string(),
        "no_colon".to_string(),
        "absent:thing".to_string(),
    ];
    let answers = get_addresses(engine, "devnet", &queries).await.unwrap();

    assert_eq!(answers.len(), 5);
    assert_eq!(answers[0].result.as_deref().unwrap(), "0x42");
    assert_eq!(answers[1].result.as_deref().unwrap(), "0x7");
    assert!(matches!(
        answers[2].result,
        Err(DevnetError::AddressNotFound { .. })
    ));
    assert!(matches!(answers[3].result, Err(DevnetError::InvalidQuery(_))));
    assert!(matches!(
        answers[4].result,
        Err(DevnetError::ArtifactUnavailable { .. })
    ));
}

#[tokio::test]
async fn addresses_of_missing_devnet_fail_whole_call() {
    let engine = Arc::new(MemoryEngine::new());
    let err = get_addresses(engine, "ghost", &["a:b".to_string()])
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DevnetError::EnclaveNotFound(_)));
}
