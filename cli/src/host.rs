//! Watch-mode host: line-oriented editor events on stdin, diagnostics on stdout.
//!
//! ```text
//! save <path>     document saved
//! open <path>     document opened / focused
//! run [path]      explicit run command
//! stop            cancel the run in flight
//! quit            shut down (EOF works too)
//! ```
//!
//! Relative paths resolve against the workspace root.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use stackrunner_build::{
    CoordinatorHandle, DiagnosticSink, RunCoordinator, RunOutcome, RunReport, RunnerConfig,
    TriggerContext, TriggerPolicy,
};
use stackrunner_types::BuildDiagnostic;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// One parsed stdin line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Saved(PathBuf),
    Opened(PathBuf),
    Run(Option<PathBuf>),
    Stop,
    Quit,
}

impl HostEvent {
    /// `Ok(None)` for blank lines.
    pub fn parse(line: &str, workspace_root: &Path) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (line, None),
        };
        let path = |arg: &str| workspace_root.join(arg);

        let event = match (verb, arg) {
            ("save", Some(arg)) => Self::Saved(path(arg)),
            ("open", Some(arg)) => Self::Opened(path(arg)),
            ("save" | "open", None) => bail!("`{verb}` needs a path"),
            ("run", arg) => Self::Run(arg.map(path)),
            ("stop", None) => Self::Stop,
            ("quit" | "exit", None) => Self::Quit,
            _ => bail!("unrecognized event: {line}"),
        };
        Ok(Some(event))
    }

    /// The trigger this event stands for, if it is one.
    pub fn into_trigger(self, workspace_root: &Path) -> Option<TriggerContext> {
        match self {
            Self::Saved(doc) => Some(TriggerContext::saved(workspace_root, doc)),
            Self::Opened(doc) => Some(TriggerContext::opened(workspace_root, doc)),
            Self::Run(doc) => Some(TriggerContext::command(workspace_root, doc)),
            Self::Stop | Self::Quit => None,
        }
    }
}

/// Sink that prints every publish and clear as it happens.
pub struct PrintingSink<W> {
    out: W,
}

impl<W: Write> PrintingSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            tracing::warn!("Failed to write diagnostics: {e}");
        }
    }
}

impl<W: Write> DiagnosticSink for PrintingSink<W> {
    fn set(&mut self, path: &Path, diagnostics: Vec<BuildDiagnostic>) {
        if diagnostics.is_empty() {
            self.clear_file(path);
            return;
        }
        for diagnostic in &diagnostics {
            self.emit(&diagnostic.display_with_path(path));
        }
    }

    fn clear_file(&mut self, path: &Path) {
        self.emit(&format!("{}: cleared", path.display()));
    }

    fn clear(&mut self) {
        self.emit("all diagnostics cleared");
    }
}

/// Human-readable line for a report, or `None` when nothing worth saying.
pub fn describe(report: &RunReport) -> Option<String> {
    let message = report.message()?;
    let prefix = match report.outcome() {
        RunOutcome::Succeeded(_) => "",
        RunOutcome::Failed(_) => "error: ",
        RunOutcome::Superseded | RunOutcome::Cancelled => "note: ",
    };
    Some(format!("{prefix}{message}"))
}

async fn print_reports(mut reports: mpsc::Receiver<RunReport>) {
    while let Some(report) = reports.recv().await {
        if let Some(line) = describe(&report) {
            eprintln!("{line}");
        }
    }
}

/// Drive a coordinator from stdin until `quit` or EOF.
pub async fn watch(workspace_root: PathBuf, config: RunnerConfig) -> Result<()> {
    let policy = TriggerPolicy::from_config(&config).context("invalid exclude pattern")?;
    let run_on_load = config.run_on_load;
    let coordinator = RunCoordinator::new(config, PrintingSink::new(std::io::stdout()));
    let (handle, reports, task) = coordinator.spawn();
    let printer = tokio::spawn(print_reports(reports));

    if run_on_load {
        handle
            .trigger(TriggerContext::command(&workspace_root, None))
            .await?;
    }

    let result = pump_events(&handle, &policy, &workspace_root).await;

    drop(handle);
    task.await.context("coordinator task panicked")?;
    printer.await.context("report printer panicked")?;
    result
}

async fn pump_events(
    handle: &CoordinatorHandle,
    policy: &TriggerPolicy,
    workspace_root: &Path,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let event = match HostEvent::parse(&line, workspace_root) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };
        tracing::debug!(?event, "Host event");

        match event {
            HostEvent::Quit => break,
            HostEvent::Stop => handle.cancel().await?,
            event => {
                if let Some(trigger) = event.into_trigger(workspace_root)
                    && policy.admits(&trigger)
                {
                    handle.trigger(trigger).await?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use stackrunner_build::{DiagnosticScope, RunError, TriggerKind};
    use stackrunner_types::{Position, SourceRange};

    use super::*;

    const ROOT: &str = "/ws";

    fn parse(line: &str) -> Option<HostEvent> {
        HostEvent::parse(line, Path::new(ROOT)).unwrap()
    }

    #[test]
    fn parses_document_events() {
        assert_eq!(
            parse("save src/Main.hs"),
            Some(HostEvent::Saved(PathBuf::from("/ws/src/Main.hs")))
        );
        assert_eq!(
            parse("  open /abs/Lib.hs  "),
            Some(HostEvent::Opened(PathBuf::from("/abs/Lib.hs")))
        );
    }

    #[test]
    fn parses_control_events() {
        assert_eq!(parse("run"), Some(HostEvent::Run(None)));
        assert_eq!(
            parse("run app/Main.hs"),
            Some(HostEvent::Run(Some(PathBuf::from("/ws/app/Main.hs"))))
        );
        assert_eq!(parse("stop"), Some(HostEvent::Stop));
        assert_eq!(parse("quit"), Some(HostEvent::Quit));
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn rejects_malformed_events() {
        let root = Path::new(ROOT);
        assert!(HostEvent::parse("save", root).is_err());
        assert!(HostEvent::parse("build now", root).is_err());
        assert!(HostEvent::parse("stop please", root).is_err());
    }

    #[test]
    fn events_map_to_triggers() {
        let root = Path::new(ROOT);
        let trigger = HostEvent::Saved(PathBuf::from("/ws/a.hs"))
            .into_trigger(root)
            .unwrap();
        assert_eq!(trigger.kind(), TriggerKind::Saved);
        assert_eq!(trigger.document(), Some(Path::new("/ws/a.hs")));
        assert_eq!(trigger.workspace_root(), root);

        let trigger = HostEvent::Run(None).into_trigger(root).unwrap();
        assert_eq!(trigger.kind(), TriggerKind::Command);
        assert!(HostEvent::Stop.into_trigger(root).is_none());
    }

    #[test]
    fn printing_sink_writes_one_line_per_diagnostic() {
        let mut sink = PrintingSink::new(Vec::new());
        let range = SourceRange::point(Position::new(2, 5));
        sink.set(
            Path::new("/ws/Main.hs"),
            vec![BuildDiagnostic::error("not in scope\n  bar".to_string(), range)],
        );
        sink.clear_file(Path::new("/ws/Old.hs"));

        let out = String::from_utf8(sink.out).unwrap();
        assert_eq!(
            out,
            "/ws/Main.hs:3:6: error: [stackrunner] not in scope\n      bar\n/ws/Old.hs: cleared\n"
        );
    }

    #[tokio::test]
    async fn describe_failure_report() {
        let mut coordinator = RunCoordinator::new(
            RunnerConfig {
                scope: DiagnosticScope::All,
                ..RunnerConfig::default()
            },
            PrintingSink::new(Vec::new()),
        );
        let report = coordinator
            .run(TriggerContext::command(ROOT, None))
            .await;
        assert!(matches!(report.outcome(), RunOutcome::Failed(RunError::Spawn(_))));
        let line = describe(&report).unwrap();
        assert!(line.starts_with("error: Build tool binary not found"));
    }
}
