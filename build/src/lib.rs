//! Build-run supervision and diagnostic projection.
//!
//! A host forwards trigger events to a [`RunCoordinator`]; the coordinator
//! runs the build tool through a [`ProcessSupervisor`], turns its JSON error
//! list into per-file diagnostics, and publishes them into a
//! [`DiagnosticSink`].

mod aggregate;
mod config;
mod coordinator;
mod error;
mod range;
mod sink;
mod supervisor;
mod trigger;

pub use aggregate::DiagnosticAggregator;
pub use config::{DiagnosticScope, RunnerConfig};
pub use coordinator::{
    BuildSummary, CoordinatorClosed, CoordinatorHandle, RunCoordinator, RunOutcome, RunPhase,
    RunReport, RunState,
};
pub use error::{ProcessError, RunError, SpawnError};
pub use range::{PrimaryExtensions, RangeResolver, SourcePredicate};
pub use sink::{DiagnosticSink, DiagnosticsSnapshot, DiagnosticsStore};
pub use supervisor::{PendingRun, ProcessSupervisor, RunHandle, RunId};
pub use trigger::{TriggerContext, TriggerKind, TriggerPolicy};
