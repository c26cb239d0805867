//! Publishable diagnostics and the per-file diagnostic set.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::path::{Path, PathBuf};

use crate::position::SourceRange;

/// Source label attached to every diagnostic stackrunner publishes.
pub const DIAGNOSTIC_SOURCE: &str = "stackrunner";

/// Severity level for a diagnostic.
///
/// The build tool only reports build-blocking problems, so every published
/// diagnostic is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    Error,
}

impl DiagnosticSeverity {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
        }
    }
}

/// A single diagnostic projected from one build-tool record.
///
/// Fields are private; a diagnostic is immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDiagnostic {
    severity: DiagnosticSeverity,
    message: String,
    range: SourceRange,
    source: &'static str,
}

impl BuildDiagnostic {
    #[must_use]
    pub fn error(message: String, range: SourceRange) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            message,
            range,
            source: DIAGNOSTIC_SOURCE,
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    /// Message lines joined with `\n`.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn range(&self) -> SourceRange {
        self.range
    }

    #[must_use]
    pub fn source(&self) -> &str {
        self.source
    }

    /// Format as `path:line:col: severity: [source] message` (1-indexed for display).
    ///
    /// Continuation lines of a multi-line message are indented under the header.
    #[must_use]
    pub fn display_with_path(&self, path: &Path) -> String {
        let start = self.range.start();
        let message = self.message.replace('\n', "\n    ");
        format!(
            "{}:{}:{}: {}: [{}] {}",
            path.display(),
            u64::from(start.line()) + 1,
            u64::from(start.column()) + 1,
            self.severity.label(),
            self.source,
            message,
        )
    }
}

/// Diagnostics grouped by file.
///
/// Keys are unique and iterate in path order; within a file, diagnostics keep
/// the order they were pushed in. An empty set means "no problems anywhere".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticSet {
    files: BTreeMap<PathBuf, Vec<BuildDiagnostic>>,
}

impl DiagnosticSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic to `path`'s sequence.
    pub fn push(&mut self, path: PathBuf, diagnostic: BuildDiagnostic) {
        self.files.entry(path).or_default().push(diagnostic);
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&[BuildDiagnostic]> {
        self.files.get(path).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Number of files with at least one diagnostic.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Diagnostic count across all files.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[BuildDiagnostic])> {
        self.files
            .iter()
            .map(|(path, items)| (path.as_path(), items.as_slice()))
    }

    /// Keep only the files for which `keep` returns true.
    pub fn retain_files(&mut self, mut keep: impl FnMut(&Path) -> bool) {
        self.files.retain(|path, _| keep(path));
    }
}

impl IntoIterator for DiagnosticSet {
    type Item = (PathBuf, Vec<BuildDiagnostic>);
    type IntoIter = btree_map::IntoIter<PathBuf, Vec<BuildDiagnostic>>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}
