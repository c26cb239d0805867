//! Diagnostic sink: the host-side collection the coordinator publishes into.
//!
//! Every mutation is a full-file replace or a clear. The coordinator is the
//! only writer, so no finer-grained locking is needed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use stackrunner_types::BuildDiagnostic;

/// Receives published diagnostics, keyed by file.
pub trait DiagnosticSink {
    /// Replace `path`'s diagnostics. An empty list clears the file.
    fn set(&mut self, path: &Path, diagnostics: Vec<BuildDiagnostic>);

    /// Remove every diagnostic for `path`.
    fn clear_file(&mut self, path: &Path);

    /// Remove everything.
    fn clear(&mut self);
}

/// In-memory sink that keeps per-file diagnostics for display.
#[derive(Debug, Default)]
pub struct DiagnosticsStore {
    data: HashMap<PathBuf, Vec<BuildDiagnostic>>,
}

impl DiagnosticsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&[BuildDiagnostic]> {
        self.data.get(path).map(Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy of the current contents, ordered by path.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut files: Vec<(PathBuf, Vec<BuildDiagnostic>)> = self
            .data
            .iter()
            .map(|(path, items)| (path.clone(), items.clone()))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        DiagnosticsSnapshot { files }
    }
}

impl DiagnosticSink for DiagnosticsStore {
    fn set(&mut self, path: &Path, diagnostics: Vec<BuildDiagnostic>) {
        if diagnostics.is_empty() {
            self.data.remove(path);
        } else {
            self.data.insert(path.to_path_buf(), diagnostics);
        }
    }

    fn clear_file(&mut self, path: &Path) {
        self.data.remove(path);
    }

    fn clear(&mut self) {
        self.data.clear();
    }
}

/// Immutable snapshot of a store, suitable for UI rendering.
///
/// Counts are computed from `files`, never cached.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    files: Vec<(PathBuf, Vec<BuildDiagnostic>)>,
}

impl DiagnosticsSnapshot {
    /// Per-file diagnostics, sorted by path.
    #[must_use]
    pub fn files(&self) -> &[(PathBuf, Vec<BuildDiagnostic>)] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|(_, items)| items.len()).sum()
    }

    /// Compact status like "E:3 in 2 files". Empty when there is nothing.
    #[must_use]
    pub fn status_string(&self) -> String {
        match self.files.len() {
            0 => String::new(),
            1 => format!("E:{} in 1 file", self.total_count()),
            n => format!("E:{} in {n} files", self.total_count()),
        }
    }
}
