//! Trigger events and the policy that decides which ones start a run.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::RunnerConfig;

/// What the host observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// A document was saved.
    Saved,
    /// A document was opened or became the active editor.
    Opened,
    /// The user invoked the run command explicitly.
    Command,
}

/// Everything a run needs to know about why it was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerContext {
    kind: TriggerKind,
    workspace_root: PathBuf,
    document: Option<PathBuf>,
}

impl TriggerContext {
    #[must_use]
    pub fn saved(workspace_root: impl Into<PathBuf>, document: impl Into<PathBuf>) -> Self {
        Self {
            kind: TriggerKind::Saved,
            workspace_root: workspace_root.into(),
            document: Some(document.into()),
        }
    }

    #[must_use]
    pub fn opened(workspace_root: impl Into<PathBuf>, document: impl Into<PathBuf>) -> Self {
        Self {
            kind: TriggerKind::Opened,
            workspace_root: workspace_root.into(),
            document: Some(document.into()),
        }
    }

    /// Explicit run; `document` is `None` when no editor is focused.
    #[must_use]
    pub fn command(workspace_root: impl Into<PathBuf>, document: Option<PathBuf>) -> Self {
        Self {
            kind: TriggerKind::Command,
            workspace_root: workspace_root.into(),
            document,
        }
    }

    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    #[must_use]
    pub fn document(&self) -> Option<&Path> {
        self.document.as_deref()
    }
}

/// Gate applied by the host before forwarding a trigger to the coordinator.
#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    run_on_save: bool,
    run_on_load: bool,
    exclude: GlobSet,
}

impl TriggerPolicy {
    pub fn from_config(config: &RunnerConfig) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            run_on_save: config.run_on_save,
            run_on_load: config.run_on_load,
            exclude: builder.build()?,
        })
    }

    /// Whether `trigger` should start a run.
    ///
    /// Explicit commands always pass. Save and open events need their toggle
    /// enabled and a document that matches no exclusion pattern.
    #[must_use]
    pub fn admits(&self, trigger: &TriggerContext) -> bool {
        let enabled = match trigger.kind() {
            TriggerKind::Command => return true,
            TriggerKind::Saved => self.run_on_save,
            TriggerKind::Opened => self.run_on_load,
        };
        if !enabled {
            return false;
        }
        match trigger.document() {
            Some(document) if self.is_excluded(document) => {
                tracing::trace!(path = %document.display(), "Trigger skipped by exclusion pattern");
                false
            }
            _ => true,
        }
    }

    fn is_excluded(&self, document: &Path) -> bool {
        self.exclude.is_match(document)
            || document
                .file_name()
                .is_some_and(|name| self.exclude.is_match(name))
    }
}
