//! stackrunner - run the build tool once, or keep running it on editor events.
//!
//! ```text
//! stackrunner [--watch] [WORKSPACE]
//! ```
//!
//! One-shot mode prints every diagnostic and exits 0 on a clean build, 1 when
//! the build reported errors, 2 when the run itself failed. Watch mode reads
//! host events from stdin (see [`host`]).

mod host;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use stackrunner_build::{DiagnosticsStore, RunCoordinator, RunOutcome, RunnerConfig, TriggerContext};
use stackrunner_config::StackRunnerConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const USAGE: &str = "\
Usage: stackrunner [--watch] [WORKSPACE]

Runs the configured build tool against WORKSPACE (default: current directory)
and prints its errors as diagnostics.

Options:
  -w, --watch   Read editor events (save/open/run/stop/quit) from stdin
  -h, --help    Show this message

Configuration: ~/.stackrunner/config.toml ([runner] table).
STACKRUNNER_SERVER_BINARY overrides runner.server_binary.";

#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Help,
    Run { watch: bool, workspace: Option<PathBuf> },
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Invocation> {
    let mut watch = false;
    let mut workspace = None;

    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "-w" | "--watch" => watch = true,
            flag if flag.starts_with('-') => bail!("unknown option: {flag}"),
            _ if workspace.is_some() => bail!("more than one workspace given"),
            _ => workspace = Some(PathBuf::from(&arg)),
        }
    }
    Ok(Invocation::Run { watch, workspace })
}

/// Logs go to stderr so stdout stays reserved for diagnostics.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_runner_config() -> RunnerConfig {
    StackRunnerConfig::load()
        .ok()
        .flatten()
        .unwrap_or_default()
        .runner_config()
}

async fn run_once(workspace_root: PathBuf, config: RunnerConfig) -> ExitCode {
    let mut coordinator = RunCoordinator::new(config, DiagnosticsStore::new());
    let report = coordinator
        .run(TriggerContext::command(workspace_root, None))
        .await;

    let snapshot = coordinator.sink().snapshot();
    for (path, diagnostics) in snapshot.files() {
        for diagnostic in diagnostics {
            println!("{}", diagnostic.display_with_path(path));
        }
    }
    if let Some(line) = host::describe(&report) {
        eprintln!("{line}");
    }

    match report.outcome() {
        RunOutcome::Succeeded(summary) if summary.is_clean() => ExitCode::SUCCESS,
        RunOutcome::Succeeded(_) => ExitCode::from(1),
        RunOutcome::Failed(_) | RunOutcome::Superseded | RunOutcome::Cancelled => {
            ExitCode::from(2)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let (watch, workspace) = match parse_args(std::env::args().skip(1))? {
        Invocation::Help => {
            println!("{USAGE}");
            return Ok(ExitCode::SUCCESS);
        }
        Invocation::Run { watch, workspace } => (watch, workspace),
    };

    let workspace = match workspace {
        Some(path) => path,
        None => std::env::current_dir().context("reading current directory")?,
    };
    let workspace_root = std::fs::canonicalize(&workspace)
        .with_context(|| format!("workspace {} does not exist", workspace.display()))?;

    let config = load_runner_config();
    tracing::debug!(root = %workspace_root.display(), ?config, "Starting");

    if watch {
        host::watch(workspace_root, config).await?;
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(run_once(workspace_root, config).await)
    }
}
