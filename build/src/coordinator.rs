//! RunCoordinator: one trigger -> process -> publish/clear cycle at a time.
//!
//! Phases: `Idle -> Starting -> AwaitingOutput -> Idle`, ending every run in
//! exactly one [`RunOutcome`]. A newer trigger supersedes the run in flight:
//! its process is killed, the diagnostics this coordinator published are
//! cleared, and any late result carrying its id is discarded. Failures leave
//! published diagnostics untouched.
//!
//! Hosts either drive [`RunCoordinator::run`] directly, or move the
//! coordinator onto a task with [`RunCoordinator::spawn`] and feed triggers
//! through the returned [`CoordinatorHandle`].

use std::collections::BTreeSet;
use std::future;
use std::path::{Component, Path, PathBuf};

use stackrunner_types::ErrorRecord;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::aggregate::DiagnosticAggregator;
use crate::config::{DiagnosticScope, RunnerConfig};
use crate::error::{RunError, SpawnError};
use crate::range::{PrimaryExtensions, RangeResolver};
use crate::sink::DiagnosticSink;
use crate::supervisor::{PendingRun, ProcessSupervisor, RunId};
use crate::trigger::TriggerContext;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Where the coordinator is in its cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPhase {
    #[default]
    Idle,
    Starting,
    AwaitingOutput(RunId),
}

/// Counts for a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    /// Records the build tool reported.
    pub reported: usize,
    /// Diagnostics published after scope filtering.
    pub published: usize,
    /// Files those diagnostics landed in.
    pub files: usize,
}

impl BuildSummary {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.reported == 0
    }

    fn message(&self) -> String {
        if self.is_clean() {
            return "Build succeeded with no errors".to_string();
        }
        let mut message = format!(
            "Build reported {} error{} in {} file{}",
            self.reported,
            plural(self.reported),
            self.files,
            plural(self.files),
        );
        let hidden = self.reported - self.published;
        if hidden > 0 {
            message.push_str(&format!(" ({hidden} outside the diagnostic scope)"));
        }
        message
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Terminal state of one run.
#[derive(Debug)]
pub enum RunOutcome {
    Succeeded(BuildSummary),
    Failed(RunError),
    /// A newer trigger replaced this run.
    Superseded,
    /// The host asked to stop.
    Cancelled,
}

/// What the host observes for every run.
#[derive(Debug)]
pub struct RunReport {
    run_id: Option<RunId>,
    outcome: RunOutcome,
    message: Option<String>,
}

impl RunReport {
    /// `None` when the run failed before a process was spawned.
    #[must_use]
    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    #[must_use]
    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    /// Text for a host notification, if the outcome warrants one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn into_outcome(self) -> RunOutcome {
        self.outcome
    }
}

/// The run currently awaiting output.
#[derive(Debug, Clone)]
struct InFlight {
    id: RunId,
    workspace_root: PathBuf,
    document: Option<PathBuf>,
}

/// Per-coordinator run state. Never shared across coordinators.
#[derive(Debug, Default)]
pub struct RunState {
    phase: RunPhase,
    in_flight: Option<InFlight>,
    last_trigger_document: Option<PathBuf>,
    /// Files this coordinator has published diagnostics for.
    published: BTreeSet<PathBuf>,
}

impl RunState {
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Most recent document carried by a trigger.
    #[must_use]
    pub fn last_trigger_document(&self) -> Option<&Path> {
        self.last_trigger_document.as_deref()
    }

    pub fn published_files(&self) -> impl Iterator<Item = &Path> {
        self.published.iter().map(PathBuf::as_path)
    }
}

pub struct RunCoordinator<S> {
    config: RunnerConfig,
    aggregator: DiagnosticAggregator,
    supervisor: ProcessSupervisor,
    sink: S,
    state: RunState,
}

impl<S: DiagnosticSink> RunCoordinator<S> {
    pub fn new(config: RunnerConfig, sink: S) -> Self {
        let resolver = RangeResolver::new(PrimaryExtensions::new(&config.primary_extensions));
        Self {
            aggregator: DiagnosticAggregator::new(resolver),
            supervisor: ProcessSupervisor::new(config.timeout()),
            config,
            sink,
            state: RunState::default(),
        }
    }

    /// Replace the default extension-based primary-source check.
    pub fn with_range_resolver(mut self, resolver: RangeResolver) -> Self {
        self.aggregator = DiagnosticAggregator::new(resolver);
        self
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run one full cycle for `trigger`.
    ///
    /// A run left in flight by a dropped `run` future is superseded first.
    pub async fn run(&mut self, trigger: TriggerContext) -> RunReport {
        if let Some(stale) = self.supersede() {
            tracing::debug!(run_id = ?stale.run_id(), "Superseded an abandoned run");
        }
        let pending = match self.begin(trigger) {
            Ok(pending) => pending,
            Err(report) => return report,
        };
        let id = pending.id();
        let result = pending.await;
        self.complete(id, result)
    }

    /// Stop the in-flight run, if any, and clear what this coordinator published.
    pub fn cancel(&mut self) -> Option<RunReport> {
        let run = self.abandon()?;
        tracing::info!(run_id = %run.id, "Build run cancelled");
        Some(RunReport {
            run_id: Some(run.id),
            outcome: RunOutcome::Cancelled,
            message: Some(RunError::Cancelled.user_message()),
        })
    }

    /// Cancel the in-flight run because a newer trigger arrived.
    fn supersede(&mut self) -> Option<RunReport> {
        let run = self.abandon()?;
        tracing::info!(run_id = %run.id, "Build run superseded");
        Some(RunReport {
            run_id: Some(run.id),
            outcome: RunOutcome::Superseded,
            message: None,
        })
    }

    fn abandon(&mut self) -> Option<InFlight> {
        let run = self.state.in_flight.take()?;
        self.supervisor.cancel_active();
        self.state.phase = RunPhase::Idle;
        self.clear_published();
        Some(run)
    }

    /// `Idle -> Starting -> AwaitingOutput`. Expects no run in flight.
    fn begin(&mut self, trigger: TriggerContext) -> Result<PendingRun, RunReport> {
        self.state.phase = RunPhase::Starting;
        if let Some(document) = trigger.document() {
            self.state.last_trigger_document = Some(document.to_path_buf());
        }
        let document = trigger
            .document()
            .map(Path::to_path_buf)
            .or_else(|| self.state.last_trigger_document.clone());

        let Some(binary) = self.config.server_binary() else {
            return Err(self.fail_to_start(SpawnError::NotFound { binary: None }));
        };
        let binary = binary.to_string();

        match self.supervisor.start(&binary, trigger.workspace_root()) {
            Ok((pending, handle)) => {
                self.state.phase = RunPhase::AwaitingOutput(handle.id());
                self.state.in_flight = Some(InFlight {
                    id: handle.id(),
                    workspace_root: trigger.workspace_root().to_path_buf(),
                    document,
                });
                Ok(pending)
            }
            Err(err) => Err(self.fail_to_start(err)),
        }
    }

    fn fail_to_start(&mut self, err: SpawnError) -> RunReport {
        self.state.phase = RunPhase::Idle;
        let err = RunError::from(err);
        tracing::warn!("Build tool failed to start: {err}");
        RunReport {
            run_id: None,
            message: Some(err.user_message()),
            outcome: RunOutcome::Failed(err),
        }
    }

    /// `AwaitingOutput -> Idle`, publishing on success.
    fn complete(&mut self, id: RunId, result: Result<Vec<ErrorRecord>, RunError>) -> RunReport {
        let run = match self.state.in_flight.take() {
            Some(run) if run.id == id => run,
            other => {
                self.state.in_flight = other;
                tracing::warn!(run_id = %id, "Discarding output from a stale run");
                return RunReport {
                    run_id: Some(id),
                    outcome: RunOutcome::Superseded,
                    message: None,
                };
            }
        };
        self.supervisor.release(id);
        self.state.phase = RunPhase::Idle;

        match result {
            Ok(records) => {
                let summary = self.publish(&records, &run);
                tracing::info!(
                    run_id = %id,
                    reported = summary.reported,
                    published = summary.published,
                    files = summary.files,
                    "Build run finished"
                );
                RunReport {
                    run_id: Some(id),
                    message: Some(summary.message()),
                    outcome: RunOutcome::Succeeded(summary),
                }
            }
            Err(err) => {
                tracing::warn!(run_id = %id, "Build run failed: {err}");
                RunReport {
                    run_id: Some(id),
                    message: Some(err.user_message()),
                    outcome: RunOutcome::Failed(err),
                }
            }
        }
    }

    /// Replace the published set with `records`' diagnostics. Files published
    /// before but absent now are cleared.
    fn publish(&mut self, records: &[ErrorRecord], run: &InFlight) -> BuildSummary {
        let mut set = self.aggregator.aggregate(records);
        match (self.config.scope, run.document.as_deref()) {
            (DiagnosticScope::All, _) => {}
            (DiagnosticScope::Document, Some(document)) => {
                set.retain_files(|path| path == document);
            }
            (DiagnosticScope::Workspace | DiagnosticScope::Document, _) => {
                let root = normalize_path(&run.workspace_root);
                set.retain_files(|path| normalize_path(path).starts_with(&root));
            }
        }

        let summary = BuildSummary {
            reported: records.len(),
            published: set.total_count(),
            files: set.file_count(),
        };

        let previous = std::mem::take(&mut self.state.published);
        for stale in previous.iter().filter(|path| !set.contains_file(path)) {
            tracing::debug!(path = %stale.display(), "Clearing diagnostics");
            self.sink.clear_file(stale);
        }
        for (path, diagnostics) in set {
            tracing::debug!(path = %path.display(), count = diagnostics.len(), "Publishing diagnostics");
            self.sink.set(&path, diagnostics);
            self.state.published.insert(path);
        }
        summary
    }

    fn clear_published(&mut self) {
        for path in std::mem::take(&mut self.state.published) {
            tracing::debug!(path = %path.display(), "Clearing diagnostics");
            self.sink.clear_file(&path);
        }
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

// ── Trigger channel ──────────────────────────────────────────

#[derive(Debug)]
enum CoordinatorCommand {
    Trigger(TriggerContext),
    Cancel,
}

#[derive(Debug, Clone, Copy, Error)]
#[error("run coordinator has shut down")]
pub struct CoordinatorClosed;

/// Inbound side of a spawned coordinator. Dropping every clone shuts it down.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// Queue a run. Supersedes whatever run is in flight when it is processed.
    pub async fn trigger(&self, trigger: TriggerContext) -> Result<(), CoordinatorClosed> {
        self.tx
            .send(CoordinatorCommand::Trigger(trigger))
            .await
            .map_err(|_| CoordinatorClosed)
    }

    /// Stop the in-flight run without starting a new one.
    pub async fn cancel(&self) -> Result<(), CoordinatorClosed> {
        self.tx
            .send(CoordinatorCommand::Cancel)
            .await
            .map_err(|_| CoordinatorClosed)
    }
}

impl<S: DiagnosticSink + Send + 'static> RunCoordinator<S> {
    /// Move the coordinator onto a tokio task.
    ///
    /// Commands are handled in arrival order. Reports arrive on the returned
    /// receiver; the host should keep draining it. Once every handle is
    /// dropped, the loop cancels any run in flight and the join handle yields
    /// the coordinator back.
    pub fn spawn(self) -> (CoordinatorHandle, mpsc::Receiver<RunReport>, JoinHandle<Self>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (report_tx, report_rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        let task = tokio::spawn(self.serve(command_rx, report_tx));
        (CoordinatorHandle { tx: command_tx }, report_rx, task)
    }

    async fn serve(
        mut self,
        mut commands: mpsc::Receiver<CoordinatorCommand>,
        reports: mpsc::Sender<RunReport>,
    ) -> Self {
        let mut pending: Option<PendingRun> = None;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    match command {
                        CoordinatorCommand::Trigger(trigger) => {
                            pending = None;
                            if let Some(report) = self.supersede() {
                                emit(&reports, report).await;
                            }
                            match self.begin(trigger) {
                                Ok(run) => pending = Some(run),
                                Err(report) => emit(&reports, report).await,
                            }
                        }
                        CoordinatorCommand::Cancel => {
                            pending = None;
                            match self.cancel() {
                                Some(report) => emit(&reports, report).await,
                                None => tracing::trace!("Cancel requested with no run in flight"),
                            }
                        }
                    }
                }
                result = wait_for(&mut pending) => {
                    let Some(run) = pending.take() else { continue };
                    let report = self.complete(run.id(), result);
                    emit(&reports, report).await;
                }
            }
        }

        if self.cancel().is_some() {
            tracing::debug!("Coordinator shut down with a run in flight");
        }
        self
    }
}

async fn wait_for(pending: &mut Option<PendingRun>) -> Result<Vec<ErrorRecord>, RunError> {
    match pending {
        Some(run) => run.await,
        None => future::pending().await,
    }
}

async fn emit(reports: &mpsc::Sender<RunReport>, report: RunReport) {
    if reports.send(report).await.is_err() {
        tracing::trace!("Run report dropped; receiver closed");
    }
}
