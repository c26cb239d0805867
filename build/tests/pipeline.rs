//! End-to-end runs against a scripted stand-in for the build tool.
//!
//! The script switches on its single argument (the workspace root), so each
//! test picks the tool's behavior through the root it triggers with.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stackrunner_build::{
    DiagnosticScope, DiagnosticSink, DiagnosticsStore, ProcessError, RunCoordinator, RunError,
    RunOutcome, RunReport, RunnerConfig, SpawnError, TriggerContext,
};
use stackrunner_types::{BuildDiagnostic, Position};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time;

const FAKE_STACK: &str = r#"#!/bin/sh
case "$1" in
  */errors)
    cat <<'EOF'
[
  {"file": "/p/src/Main.hs", "line": 3, "column": 5, "extras": "",
   "details": ["[warn] Foo.hs:3:5: error: Variable not in scope: bar"]},
  {"file": "/p/package.yaml", "line": 1, "column": 0, "extras": "dependency mismatch",
   "details": ["version conflict"]}
]
EOF
    ;;
  */other)
    cat <<'EOF'
[{"file": "/p/src/Other.hs", "line": 10, "column": 2, "extras": "", "details": ["[error] parse error"]}]
EOF
    ;;
  */clean)
    echo '[]'
    ;;
  */garbage)
    echo 'Building all executables for `p` once.'
    ;;
  */failing)
    echo '[]'
    echo 'Error: no resolver in stack.yaml' >&2
    exit 1
    ;;
  */slow)
    sleep 30
    echo '[{"file": "/p/src/Slow.hs", "line": 1, "column": 0, "extras": "", "details": ["late"]}]'
    ;;
  */hang)
    exec sleep 30
    ;;
esac
"#;

struct Fixture {
    dir: TempDir,
    tool: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("fake-stack");
        fs::write(&tool, FAKE_STACK).unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, tool }
    }

    fn config(&self) -> RunnerConfig {
        RunnerConfig {
            server_binary: Some(self.tool.to_string_lossy().into_owned()),
            ..RunnerConfig::default()
        }
    }

    fn coordinator(&self) -> RunCoordinator<DiagnosticsStore> {
        RunCoordinator::new(self.config(), DiagnosticsStore::new())
    }

    /// Workspace root that selects `mode` in the script.
    fn root(&self, mode: &str) -> PathBuf {
        self.dir.path().join(mode)
    }
}

/// Store readable from the test while a spawned coordinator owns the sink.
#[derive(Clone, Default)]
struct SharedStore(Arc<Mutex<DiagnosticsStore>>);

impl SharedStore {
    fn has(&self, path: &str) -> bool {
        self.0.lock().unwrap().get(Path::new(path)).is_some()
    }
}

impl DiagnosticSink for SharedStore {
    fn set(&mut self, path: &Path, diagnostics: Vec<BuildDiagnostic>) {
        self.0.lock().unwrap().set(path, diagnostics);
    }

    fn clear_file(&mut self, path: &Path) {
        self.0.lock().unwrap().clear_file(path);
    }

    fn clear(&mut self) {
        self.0.lock().unwrap().clear();
    }
}

fn command(root: &Path) -> TriggerContext {
    TriggerContext::command(root, None)
}

async fn next_report(reports: &mut mpsc::Receiver<RunReport>) -> RunReport {
    time::timeout(Duration::from_secs(10), reports.recv())
        .await
        .expect("report within 10s")
        .expect("coordinator still running")
}

#[tokio::test]
async fn publishes_point_and_whole_document_ranges() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator();

    let report = coordinator.run(command(&fixture.root("errors"))).await;

    match report.outcome() {
        RunOutcome::Succeeded(summary) => {
            assert_eq!(summary.reported, 2);
            assert_eq!(summary.files, 2);
        }
        other => panic!("expected Succeeded, got {other:?}"),
    }

    let main = coordinator.sink().get(Path::new("/p/src/Main.hs")).unwrap();
    assert_eq!(main.len(), 1);
    assert_eq!(main[0].message(), "error: Variable not in scope: bar");
    assert_eq!(main[0].range().start(), Position::new(2, 5));
    assert!(main[0].range().is_empty());
    assert_eq!(main[0].source(), "stackrunner");

    let manifest = coordinator.sink().get(Path::new("/p/package.yaml")).unwrap();
    assert_eq!(manifest[0].message(), "dependency mismatch\nversion conflict");
    assert_eq!(manifest[0].range().start(), Position::new(0, 0));
    assert!(manifest[0].range().end().is_end_of_document());
}

#[tokio::test]
async fn clean_build_clears_previous_diagnostics() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator();

    coordinator.run(command(&fixture.root("errors"))).await;
    assert!(!coordinator.sink().is_empty());

    let report = coordinator.run(command(&fixture.root("clean"))).await;
    assert!(matches!(report.outcome(), RunOutcome::Succeeded(s) if s.is_clean()));
    assert!(coordinator.sink().is_empty());
}

#[tokio::test]
async fn next_run_replaces_published_files() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator();

    coordinator.run(command(&fixture.root("errors"))).await;
    coordinator.run(command(&fixture.root("other"))).await;

    let sink = coordinator.sink();
    assert!(sink.get(Path::new("/p/src/Main.hs")).is_none());
    assert!(sink.get(Path::new("/p/package.yaml")).is_none());
    let other = sink.get(Path::new("/p/src/Other.hs")).unwrap();
    assert_eq!(other[0].message(), "parse error");
    assert_eq!(other[0].range().start(), Position::new(9, 2));
}

#[tokio::test]
async fn malformed_output_leaves_diagnostics_unchanged() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator();
    coordinator.run(command(&fixture.root("errors"))).await;

    let report = coordinator.run(command(&fixture.root("garbage"))).await;

    assert!(matches!(report.outcome(), RunOutcome::Failed(RunError::Parse(_))));
    assert!(report.message().is_some());
    assert_eq!(coordinator.sink().snapshot().total_count(), 2);
}

#[tokio::test]
async fn nonzero_exit_is_a_failure_even_with_valid_output() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator();
    coordinator.run(command(&fixture.root("errors"))).await;

    let report = coordinator.run(command(&fixture.root("failing"))).await;

    assert!(matches!(
        report.outcome(),
        RunOutcome::Failed(RunError::Process(ProcessError::Exited { .. }))
    ));
    assert!(report.message().unwrap().contains("no resolver"));
    assert_eq!(coordinator.sink().snapshot().total_count(), 2);
}

#[tokio::test]
async fn missing_binary_reports_not_found() {
    let fixture = Fixture::new();
    let config = RunnerConfig {
        server_binary: Some(fixture.dir.path().join("nope").to_string_lossy().into_owned()),
        ..RunnerConfig::default()
    };
    let mut coordinator = RunCoordinator::new(config, DiagnosticsStore::new());

    let report = coordinator.run(command(&fixture.root("errors"))).await;

    assert!(report.run_id().is_none());
    assert!(matches!(
        report.outcome(),
        RunOutcome::Failed(RunError::Spawn(SpawnError::NotFound { binary: Some(_) }))
    ));
    assert!(report.message().unwrap().contains("not found"));
    assert!(coordinator.sink().is_empty());
}

#[tokio::test]
async fn hung_tool_times_out() {
    let fixture = Fixture::new();
    let config = RunnerConfig {
        timeout_ms: Some(200),
        ..fixture.config()
    };
    let mut coordinator = RunCoordinator::new(config, DiagnosticsStore::new());

    let report = time::timeout(
        Duration::from_secs(10),
        coordinator.run(command(&fixture.root("hang"))),
    )
    .await
    .unwrap();

    assert!(matches!(report.outcome(), RunOutcome::Failed(RunError::Timeout(_))));
    assert_eq!(report.message(), Some("Build tool timed out after 200 ms"));
}

#[tokio::test]
async fn workspace_scope_drops_files_outside_root() {
    let fixture = Fixture::new();
    let config = RunnerConfig {
        scope: DiagnosticScope::Workspace,
        ..fixture.config()
    };
    let mut coordinator = RunCoordinator::new(config, DiagnosticsStore::new());

    // Every reported file lives under /p, not under the temp root.
    let report = coordinator.run(command(&fixture.root("errors"))).await;

    match report.outcome() {
        RunOutcome::Succeeded(summary) => {
            assert_eq!(summary.reported, 2);
            assert_eq!(summary.published, 0);
        }
        other => panic!("expected Succeeded, got {other:?}"),
    }
    assert!(coordinator.sink().is_empty());
}

#[tokio::test]
async fn newer_trigger_supersedes_without_resurrection() {
    let fixture = Fixture::new();
    let (handle, mut reports, task) = fixture.coordinator().spawn();

    handle.trigger(command(&fixture.root("slow"))).await.unwrap();
    handle.trigger(command(&fixture.root("other"))).await.unwrap();

    let first = next_report(&mut reports).await;
    assert!(matches!(first.outcome(), RunOutcome::Superseded));
    let second = next_report(&mut reports).await;
    assert!(matches!(second.outcome(), RunOutcome::Succeeded(_)));
    assert!(first.run_id() < second.run_id());

    drop(handle);
    let coordinator = task.await.unwrap();
    let sink = coordinator.into_sink();
    assert!(sink.get(Path::new("/p/src/Slow.hs")).is_none());
    assert!(sink.get(Path::new("/p/src/Other.hs")).is_some());
    assert!(reports.recv().await.is_none());
}

#[tokio::test]
async fn superseding_clears_earlier_results_before_the_new_run() {
    let fixture = Fixture::new();
    let store = SharedStore::default();
    let coordinator = RunCoordinator::new(fixture.config(), store.clone());
    let (handle, mut reports, task) = coordinator.spawn();

    handle.trigger(command(&fixture.root("errors"))).await.unwrap();
    let done = next_report(&mut reports).await;
    assert!(matches!(done.outcome(), RunOutcome::Succeeded(_)));
    assert!(store.has("/p/src/Main.hs"));

    // Nothing is in flight, so the slow run supersedes nothing and the
    // errors run's files stay published while it runs.
    handle.trigger(command(&fixture.root("slow"))).await.unwrap();
    handle.trigger(command(&fixture.root("other"))).await.unwrap();

    let superseded = next_report(&mut reports).await;
    assert!(matches!(superseded.outcome(), RunOutcome::Superseded));
    assert!(!store.has("/p/src/Main.hs"));
    assert!(!store.has("/p/package.yaml"));

    let fresh = next_report(&mut reports).await;
    assert!(matches!(fresh.outcome(), RunOutcome::Succeeded(_)));
    assert!(store.has("/p/src/Other.hs"));
    assert!(!store.has("/p/src/Slow.hs"));

    drop(handle);
    task.await.unwrap();
    assert_eq!(store.0.lock().unwrap().snapshot().total_count(), 1);
}

#[tokio::test]
async fn cancel_stops_the_run_and_clears() {
    let fixture = Fixture::new();
    let (handle, mut reports, task) = fixture.coordinator().spawn();

    handle.trigger(command(&fixture.root("errors"))).await.unwrap();
    let done = next_report(&mut reports).await;
    assert!(matches!(done.outcome(), RunOutcome::Succeeded(_)));

    handle.trigger(command(&fixture.root("slow"))).await.unwrap();
    handle.cancel().await.unwrap();

    // The errors run had already finished, so starting the slow one
    // superseded nothing. Cancelling clears what the errors run published.
    let cancelled = next_report(&mut reports).await;
    assert!(matches!(cancelled.outcome(), RunOutcome::Cancelled));
    assert_eq!(cancelled.message(), Some("Build cancelled"));

    drop(handle);
    let coordinator = task.await.unwrap();
    assert!(coordinator.into_sink().is_empty());
}
