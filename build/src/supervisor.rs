//! Process supervisor: owns the build tool child process, one run at a time.
//!
//! `start` spawns the tool and hands back a [`PendingRun`] (resolves with the
//! parsed records) and a [`RunHandle`] (cancels it). The child lives inside
//! an abortable task; aborting drops the child, and `kill_on_drop` terminates
//! the OS process. A cancelled run never delivers output.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use stackrunner_types::{ErrorRecord, parse_error_records};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time;

use crate::error::{ProcessError, RunError, SpawnError};

/// Hard cap on the payload read from stdout.
const MAX_STDOUT_BYTES: usize = 16 * 1024 * 1024;

/// Stderr is only kept for error messages.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// How long to wait for a killed child to be reaped after a timeout.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Identity of one run. Monotonically increasing per supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

impl RunId {
    #[cfg(test)]
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Cancels one run. Cloneable; cancelling twice, or after exit, is a no-op.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: RunId,
    abort: AbortHandle,
}

impl RunHandle {
    #[must_use]
    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn cancel(&self) {
        self.abort.abort();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// Deferred result of a run: the parsed records, or why there are none.
///
/// Resolves to `Err(RunError::Cancelled)` once the run's handle is cancelled.
#[derive(Debug)]
pub struct PendingRun {
    id: RunId,
    rx: oneshot::Receiver<Result<Vec<u8>, RunError>>,
}

impl PendingRun {
    #[must_use]
    pub fn id(&self) -> RunId {
        self.id
    }
}

impl Future for PendingRun {
    type Output = Result<Vec<ErrorRecord>, RunError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            // Sender dropped without a value: the task was aborted.
            Poll::Ready(Err(_)) => Poll::Ready(Err(RunError::Cancelled)),
            Poll::Ready(Ok(payload)) => Poll::Ready(
                payload.and_then(|stdout| parse_error_records(&stdout).map_err(RunError::from)),
            ),
        }
    }
}

/// Enforces at most one active build-tool process.
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    timeout: Option<Duration>,
    next_id: u64,
    active: Option<RunHandle>,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            next_id: 0,
            active: None,
        }
    }

    /// Handle of the run currently owned by this supervisor.
    #[must_use]
    pub fn active(&self) -> Option<&RunHandle> {
        self.active.as_ref()
    }

    /// Spawn `executable` with `working_dir_arg` as its only argument.
    ///
    /// Cancels the active run first. Must be called within a tokio runtime.
    pub fn start(
        &mut self,
        executable: &str,
        working_dir_arg: &Path,
    ) -> Result<(PendingRun, RunHandle), SpawnError> {
        if let Some(previous) = self.active.take() {
            tracing::debug!(run_id = %previous.id(), "Cancelling active run before starting a new one");
            previous.cancel();
        }

        let resolved = which::which(executable).map_err(|e| {
            tracing::debug!("{executable} not resolvable: {e}");
            if Path::new(executable).is_file() {
                // Present on disk, but `which` rejected it: not executable.
                SpawnError::Launch {
                    binary: executable.to_string(),
                    source: io::Error::from(io::ErrorKind::PermissionDenied),
                }
            } else {
                SpawnError::NotFound {
                    binary: Some(executable.to_string()),
                }
            }
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.arg(working_dir_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SpawnError::NotFound {
                    binary: Some(executable.to_string()),
                }
            } else {
                SpawnError::Launch {
                    binary: executable.to_string(),
                    source,
                }
            }
        })?;

        self.next_id += 1;
        let id = RunId(self.next_id);
        tracing::info!(run_id = %id, binary = %resolved.display(), root = %working_dir_arg.display(), "Build tool started");

        let (tx, rx) = oneshot::channel();
        let (abort, registration) = AbortHandle::new_pair();
        let timeout = self.timeout;
        tokio::spawn(async move {
            match Abortable::new(collect_output(child, timeout), registration).await {
                Ok(result) => {
                    let _ = tx.send(result);
                }
                Err(_aborted) => {
                    tracing::debug!(run_id = %id, "Build tool run aborted; child killed");
                }
            }
        });

        let handle = RunHandle { id, abort };
        self.active = Some(handle.clone());
        Ok((PendingRun { id, rx }, handle))
    }

    /// Forcibly terminate the run behind `handle`.
    pub fn cancel(&mut self, handle: &RunHandle) {
        handle.cancel();
        if self.active.as_ref().is_some_and(|a| a.id() == handle.id()) {
            self.active = None;
        }
    }

    /// Cancel whatever run is active. Returns its id, if there was one.
    pub fn cancel_active(&mut self) -> Option<RunId> {
        let active = self.active.take()?;
        active.cancel();
        Some(active.id())
    }

    /// Forget `id` as the active run after its result was consumed.
    pub fn release(&mut self, id: RunId) {
        if self.active.as_ref().is_some_and(|a| a.id() == id) {
            self.active = None;
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel();
        }
    }
}

/// Wait for the child to close stdout and exit; return stdout if it exited 0.
async fn collect_output(mut child: Child, timeout: Option<Duration>) -> Result<Vec<u8>, RunError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProcessError::Io(io::Error::other("no stdout from child")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ProcessError::Io(io::Error::other("no stderr from child")))?;

    let outcome = {
        let wait = async {
            let (stdout, stderr, status) = tokio::join!(
                read_capped(stdout, MAX_STDOUT_BYTES),
                read_capped(stderr, MAX_STDERR_BYTES),
                child.wait(),
            );
            Ok::<_, ProcessError>((stdout?, stderr?, status?))
        };
        match timeout {
            Some(limit) => time::timeout(limit, wait).await.ok(),
            None => Some(wait.await),
        }
    };

    let Some(result) = outcome else {
        // Only reachable with a timeout configured.
        let limit = timeout.unwrap_or_default();
        tracing::warn!("Build tool exceeded {limit:?}, killing");
        let _ = child.start_kill();
        let _ = time::timeout(KILL_GRACE, child.wait()).await;
        return Err(RunError::Timeout(limit));
    };

    let ((stdout, stdout_truncated), (stderr, _), status) = result?;
    if stdout_truncated {
        return Err(ProcessError::OutputTooLarge {
            limit: MAX_STDOUT_BYTES,
        }
        .into());
    }
    if !status.success() {
        return Err(ProcessError::Exited {
            status,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }
        .into());
    }
    Ok(stdout)
}

/// Read to EOF, keeping at most `max_bytes`. The rest is drained so the child
/// never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    max_bytes: usize,
) -> io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        let take = max_bytes.saturating_sub(buf.len()).min(n);
        buf.extend_from_slice(&tmp[..take]);
        if take < n {
            truncated = true;
        }
    }

    Ok((buf, truncated))
}
