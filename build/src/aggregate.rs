//! Turns build-tool records into a per-file diagnostic set.

use std::path::PathBuf;

use regex::Regex;
use stackrunner_types::{BuildDiagnostic, DiagnosticSet, ErrorRecord};

use crate::range::RangeResolver;

/// Message used when a record carries neither extras nor details.
const EMPTY_MESSAGE: &str = "build error";

/// Pure and deterministic: the same records always produce the same set.
#[derive(Debug)]
pub struct DiagnosticAggregator {
    resolver: RangeResolver,
    /// Everything up to and including the last log-level tag, plus a source
    /// location directly after it: `f:l:c:`, `f:l:c-c:` or `f:(l,c)-(l,c):`.
    noise: Regex,
}

impl DiagnosticAggregator {
    pub fn new(resolver: RangeResolver) -> Self {
        Self {
            resolver,
            noise: Regex::new(
                r"^.*\[(?:debug|info|warn|error)\]\s*(?:\S+?:(?:\d+:\d+(?:-\d+)?|\(\d+,\d+\)-\(\d+,\d+\)):\s*)?",
            )
            .expect("valid log noise regex"),
        }
    }

    /// Strip tool log noise from one detail line.
    #[must_use]
    pub fn strip_noise<'a>(&self, line: &'a str) -> &'a str {
        match self.noise.find(line) {
            Some(prefix) => &line[prefix.end()..],
            None => line,
        }
    }

    /// Normalized message lines: trimmed `extras` first when non-empty,
    /// then every detail with its noise prefix removed.
    #[must_use]
    pub fn message_lines(&self, record: &ErrorRecord) -> Vec<String> {
        let extras = record.extras().trim();
        let mut lines = Vec::with_capacity(record.details().len() + 1);
        if !extras.is_empty() {
            lines.push(extras.to_string());
        }
        lines.extend(
            record
                .details()
                .iter()
                .map(|detail| self.strip_noise(detail).to_string()),
        );
        lines
    }

    #[must_use]
    pub fn diagnostic(&self, record: &ErrorRecord) -> BuildDiagnostic {
        let lines = self.message_lines(record);
        let message = if lines.iter().all(|line| line.trim().is_empty()) {
            EMPTY_MESSAGE.to_string()
        } else {
            lines.join("\n")
        };
        BuildDiagnostic::error(message, self.resolver.resolve(record))
    }

    /// Group one diagnostic per record by file, in the order received.
    #[must_use]
    pub fn aggregate(&self, records: &[ErrorRecord]) -> DiagnosticSet {
        let mut set = DiagnosticSet::new();
        for record in records {
            set.push(PathBuf::from(record.file()), self.diagnostic(record));
        }
        set
    }
}

impl Default for DiagnosticAggregator {
    fn default() -> Self {
        Self::new(RangeResolver::default())
    }
}
