//! Build orchestration against a recording builder and a real shell.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use devnet_config::DevnetConfig;
use devnet_core::{build_images, DockerBuilder, ImageBuilder, ToolConfig, ToolFailure};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    Build {
        context: PathBuf,
        image: String,
        file: Option<PathBuf>,
    },
    Shell {
        command: String,
        working_dir: PathBuf,
    },
}

#[derive(Default)]
struct RecordingBuilder {
    calls: Mutex<Vec<Invocation>>,
    failing: HashSet<String>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingBuilder {
    fn failing(images: &[&str]) -> Self {
        Self {
            failing: images.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    async fn work(&self, key: &str) -> Result<(), ToolFailure> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        if self.failing.contains(key) {
            return Err(ToolFailure::Exit {
                command: format!("build {key}"),
                status: "exit status: 1".to_string(),
                output: format!("{key}: no such file"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ImageBuilder for RecordingBuilder {
    async fn build(
        &self,
        context: &Path,
        image: &str,
        file: Option<&Path>,
        _cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        self.calls.lock().unwrap().push(Invocation::Build {
            context: context.to_path_buf(),
            image: image.to_string(),
            file: file.map(Path::to_path_buf),
        });
        self.work(image).await
    }

    async fn run_shell(
        &self,
        command: &str,
        working_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), ToolFailure> {
        self.calls.lock().unwrap().push(Invocation::Shell {
            command: command.to_string(),
            working_dir: working_dir.to_path_buf(),
        });
        self.work(command).await
    }
}

fn services(yaml: &str) -> DevnetConfig {
    DevnetConfig::from_yaml(yaml).unwrap()
}

#[tokio::test]
async fn one_build_for_one_buildable_service() {
    let config = services(
        "services:\n  - name: app\n    image: app:latest\n    build_context: ./app\n  - name: node\n    image: node:latest\n",
    );
    let builder = Arc::new(RecordingBuilder::default());

    build_images(
        Path::new("/work"),
        &config.services,
        builder.clone(),
        4,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        builder.calls(),
        vec![Invocation::Build {
            context: PathBuf::from("/work/app"),
            image: "app:latest".to_string(),
            file: None,
        }]
    );
}

#[tokio::test]
async fn no_buildable_services_launches_nothing() {
    let config = services("services:\n  - name: node\n    image: node:latest\n");
    let builder = Arc::new(RecordingBuilder::default());

    build_images(
        Path::new("/work"),
        &config.services,
        builder.clone(),
        4,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(builder.calls().is_empty());
}

#[tokio::test]
async fn every_failure_is_reported_and_every_build_runs() {
    let config = services(
        r#"services:
  - name: a
    image: a:1
    build_context: ./a
  - name: b
    image: b:1
    build_context: ./b
  - name: c
    image: c:1
    build_cmd: make c
"#,
    );
    let builder = Arc::new(RecordingBuilder::failing(&["a:1", "make c"]));

    let err = build_images(
        Path::new("/work"),
        &config.services,
        builder.clone(),
        4,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(builder.calls().len(), 3);
    let mut failed = err.images();
    failed.sort_unstable();
    assert_eq!(failed, vec!["a:1", "c:1"]);
    let text = err.to_string();
    assert!(text.contains("a:1: no such file"));
    assert!(text.contains("make c: no such file"));
}

#[tokio::test]
async fn custom_command_runs_from_base_dir() {
    let config = services("services:\n  - name: t\n    image: t:1\n    build_cmd: make docker\n");
    let builder = Arc::new(RecordingBuilder::default());

    build_images(
        Path::new("/project"),
        &config.services,
        builder.clone(),
        1,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        builder.calls(),
        vec![Invocation::Shell {
            command: "make docker".to_string(),
            working_dir: PathBuf::from("/project"),
        }]
    );
}

#[tokio::test]
async fn parallelism_is_bounded() {
    let yaml: String = (0..6)
        .map(|i| format!("  - name: s{i}\n    image: s{i}:1\n    build_context: ./s{i}\n"))
        .collect();
    let config = services(&format!("services:\n{yaml}"));
    let builder = Arc::new(RecordingBuilder::default());

    build_images(
        Path::new("/work"),
        &config.services,
        builder.clone(),
        2,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(builder.calls().len(), 6);
    assert!(builder.peak.load(Ordering::SeqCst) <= 2);
}

#[cfg(unix)]
#[tokio::test]
async fn shell_builds_report_exit_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = services(
        r#"services:
  - name: ok
    image: ok:1
    build_cmd: "touch built"
  - name: bad
    image: bad:1
    build_cmd: "echo broken >&2; exit 3"
"#,
    );
    let builder = Arc::new(DockerBuilder::new(&ToolConfig::default()));

    let err = build_images(
        dir.path(),
        &config.services,
        builder,
        2,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(dir.path().join("built").exists());
    assert_eq!(err.images(), vec!["bad:1"]);
    assert!(err.to_string().contains("broken"));
}
