//! One route process, one request.
//!
//! # States
//! ```text
//! Spawned → InputWritten → Running → Completed(exit code)
//!    │            │            └────→ TimedOut
//!    └────────────┴─────────────────→ TimedOut
//! (spawn error)                     → SpawnFailed
//! ```
//!
//! # Design Decisions
//! - stdout and stderr are drained by their own tasks from the moment of
//!   spawn, so writing stdin can never deadlock against a chatty child
//! - The deadline is wall-clock from spawn and covers input, run and drain
//! - On expiry the child is killed and reaped, never abandoned
//! - `kill_on_drop` covers cancellation: dropping the future kills the child

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::dispatch::error::DispatchError;

/// Global atomic counter for invocation IDs.
static INVOCATION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// How long a killed child gets to flush what it already wrote to stderr.
const KILL_GRACE: Duration = Duration::from_millis(200);

/// Unique identifier for one process invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvocationId(u64);

impl InvocationId {
    pub fn new() -> Self {
        Self(INVOCATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inv-{}", self.0)
    }
}

/// Lifecycle state of a process invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Spawned,
    InputWritten,
    Running,
    /// Exited on its own. `parsed` says whether output was a valid response.
    Completed { exit_code: Option<i32>, parsed: bool },
    TimedOut,
    SpawnFailed,
}

impl InvocationState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_advance(self, next: InvocationState) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Spawned, InputWritten)
                | (Spawned, TimedOut)
                | (InputWritten, Running)
                | (InputWritten, TimedOut)
                | (Running, Completed { .. })
                | (Running, TimedOut)
        )
    }
}

/// Bytes read from one of the child's output streams.
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Output beyond the cap was discarded.
    pub truncated: bool,
}

impl Captured {
    pub fn lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// How an invocation ended, before its output is interpreted.
#[derive(Debug)]
pub enum Termination {
    Exited {
        status: ExitStatus,
        stdout: Captured,
        stderr: Captured,
        elapsed: Duration,
    },
    TimedOut {
        stderr: Captured,
        elapsed: Duration,
    },
}

/// Limits applied to one invocation.
#[derive(Debug, Clone, Copy)]
pub struct InvocationLimits {
    pub timeout: Duration,
    pub max_stdout: usize,
    pub max_stderr: usize,
}

/// A spawned route process.
#[derive(Debug)]
pub struct ProcessInvocation {
    id: InvocationId,
    child: Child,
    started: Instant,
    state: InvocationState,
}

impl ProcessInvocation {
    /// Start the route binary with piped standard streams.
    pub fn spawn(
        id: InvocationId,
        binary: &Path,
        working_dir: Option<&Path>,
        env: &[(&str, &str)],
    ) -> Result<Self, DispatchError> {
        let mut command = Command::new(binary);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }
        for (key, value) in env {
            command.env(key, value);
        }
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let child = command.spawn().map_err(|source| {
            tracing::debug!(invocation_id = %id, state = ?InvocationState::SpawnFailed, "Invocation state");
            DispatchError::Spawn {
                binary: binary.to_path_buf(),
                source,
            }
        })?;

        tracing::trace!(invocation_id = %id, pid = ?child.id(), state = ?InvocationState::Spawned, "Invocation state");
        Ok(Self {
            id,
            child,
            started,
            state: InvocationState::Spawned,
        })
    }

    fn advance(&mut self, next: InvocationState) {
        debug_assert!(
            self.state.can_advance(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(invocation_id = %self.id, from = ?self.state, to = ?next, "Invocation state");
        self.state = next;
    }

    /// Feed `input`, wait for exit, and collect output, all within the deadline.
    pub async fn run(mut self, input: Vec<u8>, limits: InvocationLimits) -> Result<Termination, DispatchError> {
        let deadline = self.started + limits.timeout;

        let stdout_task = self.child.stdout.take().map(|out| spawn_capture(out, limits.max_stdout));
        let stderr_task = self.child.stderr.take().map(|err| spawn_capture(err, limits.max_stderr));

        if let Some(stdin) = self.child.stdin.take() {
            match timeout_at(deadline, feed(stdin, input)).await {
                Ok(result) => result?,
                Err(_) => return Ok(self.kill(stdout_task, stderr_task).await),
            }
        }
        self.advance(InvocationState::InputWritten);
        self.advance(InvocationState::Running);

        let status = match timeout_at(deadline, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => return Ok(self.kill(stdout_task, stderr_task).await),
        };

        let stdout = match collect(stdout_task, deadline).await {
            Some(captured) => captured?,
            None => return Ok(self.kill(None, stderr_task).await),
        };
        let stderr = collect(stderr_task, deadline).await.transpose()?.unwrap_or_default();

        self.advance(InvocationState::Completed {
            exit_code: status.code(),
            parsed: false,
        });
        Ok(Termination::Exited {
            status,
            stdout,
            stderr,
            elapsed: self.started.elapsed(),
        })
    }

    async fn kill(
        mut self,
        stdout_task: Option<JoinHandle<std::io::Result<Captured>>>,
        stderr_task: Option<JoinHandle<std::io::Result<Captured>>>,
    ) -> Termination {
        // An already-reaped child reports an error here; nothing is left to kill.
        if let Err(e) = self.child.kill().await {
            tracing::debug!(invocation_id = %self.id, error = %e, "Kill after deadline failed");
        }
        if let Some(task) = stdout_task {
            task.abort();
        }
        let stderr = match collect(stderr_task, Instant::now() + KILL_GRACE).await {
            Some(Ok(captured)) => captured,
            _ => Captured::default(),
        };
        self.advance(InvocationState::TimedOut);
        Termination::TimedOut {
            stderr,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Write the request and close stdin. A child that stops reading early is not an error here.
async fn feed(mut stdin: ChildStdin, input: Vec<u8>) -> Result<(), DispatchError> {
    let written = async {
        stdin.write_all(&input).await?;
        stdin.shutdown().await
    }
    .await;
    match written {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn spawn_capture<R>(reader: R, limit: usize) -> JoinHandle<std::io::Result<Captured>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(capture(reader, limit))
}

async fn capture<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> std::io::Result<Captured> {
    let mut bytes = Vec::new();
    (&mut reader).take(limit as u64 + 1).read_to_end(&mut bytes).await?;
    let truncated = bytes.len() > limit;
    if truncated {
        bytes.truncate(limit);
        tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    }
    Ok(Captured { bytes, truncated })
}

/// Await a capture task until `deadline`; `None` means it did not finish in time.
async fn collect(
    task: Option<JoinHandle<std::io::Result<Captured>>>,
    deadline: Instant,
) -> Option<std::io::Result<Captured>> {
    let Some(mut task) = task else {
        return Some(Ok(Captured::default()));
    };
    match timeout_at(deadline, &mut task).await {
        Ok(Ok(result)) => Some(result),
        Ok(Err(join_error)) => Some(Err(std::io::Error::other(join_error))),
        Err(_) => {
            task.abort();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_ids_are_unique() {
        assert_ne!(InvocationId::new(), InvocationId::new());
    }

    #[test]
    fn legal_transitions() {
        use InvocationState::*;
        let done = Completed { exit_code: Some(0), parsed: true };

        assert!(Spawned.can_advance(InputWritten));
        assert!(InputWritten.can_advance(Running));
        assert!(Running.can_advance(done));
        assert!(Running.can_advance(TimedOut));
        assert!(Spawned.can_advance(TimedOut));

        assert!(!Spawned.can_advance(Running));
        assert!(!Running.can_advance(InputWritten));
        assert!(!done.can_advance(TimedOut));
        assert!(!SpawnFailed.can_advance(Spawned));
    }

    #[tokio::test]
    async fn capture_truncates_and_drains() {
        let data = vec![b'x'; 10_000];
        let captured = capture(&data[..], 100).await.unwrap();
        assert_eq!(captured.bytes.len(), 100);
        assert!(captured.truncated);

        let captured = capture(&b"short"[..], 100).await.unwrap();
        assert_eq!(captured.bytes, b"short");
        assert!(!captured.truncated);
    }
}
