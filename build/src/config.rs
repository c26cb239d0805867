//! Runner configuration consumed from the host's settings.

use std::time::Duration;

use serde::Deserialize;

/// Which published diagnostics survive scope filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticScope {
    /// Publish every file the build tool reported.
    #[default]
    All,
    /// Publish only files under the triggering workspace root.
    Workspace,
    /// Publish only the triggering document. Falls back to `Workspace` when
    /// the trigger carried no document.
    Document,
}

/// Configuration for the build runner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Build-tool executable, resolved through `PATH` when not absolute.
    pub server_binary: Option<String>,
    /// Run when a document is saved. Default: true.
    pub run_on_save: bool,
    /// Run when a document is opened or becomes active. Default: true.
    pub run_on_load: bool,
    /// Glob patterns of documents whose save/open events never start a run.
    pub exclude: Vec<String>,
    /// Extensions (without the dot) reported with a precise point range.
    pub primary_extensions: Vec<String>,
    pub scope: DiagnosticScope,
    /// Give up on a run after this many milliseconds. Absent: wait forever.
    pub timeout_ms: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server_binary: None,
            run_on_save: true,
            run_on_load: true,
            exclude: vec!["*.yaml".to_string(), "*.cabal".to_string()],
            primary_extensions: vec!["hs".to_string()],
            scope: DiagnosticScope::All,
            timeout_ms: None,
        }
    }
}

impl RunnerConfig {
    /// The configured binary, or `None` when unset or blank.
    #[must_use]
    pub fn server_binary(&self) -> Option<&str> {
        self.server_binary
            .as_deref()
            .map(str::trim)
            .filter(|binary| !binary.is_empty())
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
