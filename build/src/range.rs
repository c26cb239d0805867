//! Projection of a build-tool record onto a source range.
//!
//! Findings in primary source files get a zero-width marker at the reported
//! position. Anything else (project files, package manifests) is rarely tied
//! to one token, so the range runs from the reported position to the end of
//! the document.

use std::fmt;

use stackrunner_types::{ErrorRecord, Position, SourceRange};

/// Decides whether a file is primary source with precise locations.
pub trait SourcePredicate: Send + Sync {
    fn is_primary_source(&self, file: &str) -> bool;
}

impl<F> SourcePredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_primary_source(&self, file: &str) -> bool {
        self(file)
    }
}

/// Primary source = file name ends in `.<ext>` for one of the extensions.
/// Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct PrimaryExtensions {
    suffixes: Vec<String>,
}

impl PrimaryExtensions {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suffixes = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{ext}"))
            .collect();
        Self { suffixes }
    }
}

impl Default for PrimaryExtensions {
    fn default() -> Self {
        Self::new(["hs"])
    }
}

impl SourcePredicate for PrimaryExtensions {
    fn is_primary_source(&self, file: &str) -> bool {
        self.suffixes.iter().any(|suffix| file.ends_with(suffix))
    }
}

pub struct RangeResolver {
    predicate: Box<dyn SourcePredicate>,
}

impl RangeResolver {
    pub fn new(predicate: impl SourcePredicate + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }

    /// Map a record to its range.
    ///
    /// The 1-based reported line becomes 0-based, and anything at or below
    /// line 1 collapses onto the first line. Negative columns clamp to 0.
    #[must_use]
    pub fn resolve(&self, record: &ErrorRecord) -> SourceRange {
        let start = Position::new(
            clamp_to_u32(record.line().saturating_sub(1)),
            clamp_to_u32(record.column()),
        );
        if self.predicate.is_primary_source(record.file()) {
            SourceRange::point(start)
        } else {
            SourceRange::to_end_of_document(start)
        }
    }
}

impl Default for RangeResolver {
    fn default() -> Self {
        Self::new(PrimaryExtensions::default())
    }
}

impl fmt::Debug for RangeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeResolver").finish_non_exhaustive()
    }
}

fn clamp_to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
