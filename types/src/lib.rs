//! Core domain types for stackrunner.
//!
//! Pure data shared by every other crate: the problem records a build tool
//! reports, the source ranges they are projected onto, and the diagnostics
//! published for them. No IO, no async.

mod diagnostic;
mod position;
mod record;

pub use diagnostic::{BuildDiagnostic, DIAGNOSTIC_SOURCE, DiagnosticSet, DiagnosticSeverity};
pub use position::{Position, SourceRange};
pub use record::{ErrorRecord, ParseError, parse_error_records};
