//! Failure taxonomy for a build run.
//!
//! Every variant is recovered at the coordinator boundary and turned into a
//! terminal `RunOutcome::Failed` plus one user-facing message.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use stackrunner_types::ParseError;
use thiserror::Error;

/// The build tool could not be launched.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Unset in configuration, or not an executable on disk / in `PATH`.
    #[error("build tool binary {} not found", .binary.as_deref().unwrap_or("(not configured)"))]
    NotFound { binary: Option<String> },
    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: io::Error,
    },
}

/// The build tool started but did not deliver a usable payload.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("build tool exited with {status}")]
    Exited { status: ExitStatus, stderr: String },
    #[error("reading build tool output: {0}")]
    Io(#[from] io::Error),
    #[error("build tool output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("build tool output is not an error list: {0}")]
    Parse(#[from] ParseError),
    #[error("build tool did not finish within {0:?}")]
    Timeout(Duration),
    #[error("run was cancelled")]
    Cancelled,
}

impl RunError {
    /// Message suitable for a host notification.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Spawn(SpawnError::NotFound { binary: Some(binary) }) => {
                format!("Build tool binary not found: {binary}. Check the server_binary setting.")
            }
            Self::Spawn(SpawnError::NotFound { binary: None }) => {
                "Build tool binary not found. Set server_binary in the configuration.".to_string()
            }
            Self::Spawn(SpawnError::Launch { binary, source }) => {
                format!("Could not launch {binary}: {source}")
            }
            Self::Process(ProcessError::Exited { status, stderr }) => {
                match stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
                    Some(last) => format!("Build tool failed ({status}): {last}"),
                    None => format!("Build tool failed ({status})"),
                }
            }
            Self::Process(err) => format!("Build tool failed: {err}"),
            Self::Parse(err) => format!("Build tool produced unexpected output: {err}"),
            Self::Timeout(limit) => {
                format!("Build tool timed out after {} ms", limit.as_millis())
            }
            Self::Cancelled => "Build cancelled".to_string(),
        }
    }
}
