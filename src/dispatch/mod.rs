//! Process dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! ArtifactRecord + RequestEnvelope
//!     → slot permit (bounded number of live route processes)
//!     → process.rs spawn (fresh process, never reused)
//!     → wire.rs encode request → stdin, close
//!       (stdout/stderr drained concurrently)
//!     → exit / deadline
//!     → wire.rs decode last stdout line
//!     → ResponseEnvelope or classified DispatchError
//! ```
//!
//! # Design Decisions
//! - One process per request: failures cannot leak into other requests
//! - Only `Completed(exit 0, parsed)` produces a response
//! - Diagnostics (stderr, raw stdout) go to the operator log here; callers
//!   only see the error class

pub mod envelope;
pub mod error;
pub mod process;
pub mod wire;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderName, HeaderValue};
use tokio::sync::Semaphore;

use crate::config::DispatchConfig;
use crate::observability::metrics;
use crate::registry::ArtifactRecord;

pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use error::{DispatchError, ProtocolViolation};
pub use process::{InvocationId, InvocationLimits, InvocationState, ProcessInvocation, Termination};

/// Raw stdout kept in a protocol error, for the log.
const STDOUT_EXCERPT: usize = 4 * 1024;

/// Runs route artifacts, one process per request.
#[derive(Clone)]
pub struct Dispatcher {
    limits: InvocationLimits,
    working_dir: Option<PathBuf>,
    slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(config: &DispatchConfig, working_dir: Option<PathBuf>) -> Self {
        Self {
            limits: InvocationLimits {
                timeout: config.timeout(),
                max_stdout: config.max_output_bytes,
                max_stderr: config.max_stderr_bytes,
            },
            working_dir,
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
        }
    }

    /// Configured per-request deadline.
    pub fn timeout(&self) -> Duration {
        self.limits.timeout
    }

    /// Currently free process slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run `artifact` once for `request`.
    pub async fn dispatch(
        &self,
        artifact: &ArtifactRecord,
        request: &RequestEnvelope,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, DispatchError> {
        self.dispatch_with_id(artifact, request, timeout, None).await
    }

    /// As [`Dispatcher::dispatch`], passing the HTTP request ID to the child.
    pub async fn dispatch_with_id(
        &self,
        artifact: &ArtifactRecord,
        request: &RequestEnvelope,
        timeout: Duration,
        request_id: Option<&str>,
    ) -> Result<ResponseEnvelope, DispatchError> {
        let started = Instant::now();
        let result = self.run_once(artifact, request, timeout, request_id).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        metrics::record_dispatch(&artifact.route, outcome, started);
        result
    }

    async fn run_once(
        &self,
        artifact: &ArtifactRecord,
        request: &RequestEnvelope,
        timeout: Duration,
        request_id: Option<&str>,
    ) -> Result<ResponseEnvelope, DispatchError> {
        let _permit = match tokio::time::timeout(timeout, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            _ => {
                tracing::warn!(route = %artifact.route, "No process slot available");
                return Err(DispatchError::Overloaded(timeout));
            }
        };
        let _in_flight = metrics::InFlightGuard::new();

        let id = InvocationId::new();
        let input = wire::encode_request(request).map_err(std::io::Error::other)?;

        let mut env = vec![("ROUTE_PATH", artifact.route.as_str())];
        if let Some(request_id) = request_id {
            env.push(("REQUEST_ID", request_id));
        }

        tracing::debug!(
            invocation_id = %id,
            route = %artifact.route,
            binary = %artifact.binary.display(),
            "Spawning route process"
        );

        let invocation = ProcessInvocation::spawn(id, &artifact.binary, self.working_dir.as_deref(), &env)
            .inspect_err(|e| {
                tracing::error!(invocation_id = %id, route = %artifact.route, error = %e, "Spawn failed");
            })?;

        let limits = InvocationLimits { timeout, ..self.limits };
        let termination = invocation.run(input, limits).await.inspect_err(|e| {
            tracing::error!(invocation_id = %id, route = %artifact.route, error = %e, "Route I/O failed");
        })?;

        classify(id, &artifact.route, termination)
    }
}

/// Turn a finished invocation into a response or a classified error.
fn classify(id: InvocationId, route: &str, termination: Termination) -> Result<ResponseEnvelope, DispatchError> {
    let (status, stdout, stderr, elapsed) = match termination {
        Termination::TimedOut { stderr, elapsed } => {
            let stderr = stderr.lossy();
            tracing::error!(
                invocation_id = %id,
                route = %route,
                elapsed_ms = elapsed.as_millis() as u64,
                stderr = %stderr,
                "Route timed out and was killed"
            );
            return Err(DispatchError::Timeout { elapsed, stderr });
        }
        Termination::Exited {
            status,
            stdout,
            stderr,
            elapsed,
        } => (status, stdout, stderr.lossy(), elapsed),
    };

    if !status.success() {
        tracing::error!(
            invocation_id = %id,
            route = %route,
            exit_code = ?status.code(),
            stderr = %stderr,
            "Route exited unsuccessfully"
        );
        return Err(DispatchError::NonZeroExit {
            code: status.code(),
            stderr,
        });
    }

    let parsed = if stdout.truncated {
        Err(ProtocolViolation::OutputTooLarge(stdout.bytes.len()))
    } else {
        wire::decode_response(&stdout.bytes).and_then(|decoded| {
            if decoded.stray_lines > 0 {
                tracing::debug!(invocation_id = %id, lines = decoded.stray_lines, "Ignoring stray stdout lines");
            }
            validate_headers(&decoded.response)?;
            Ok(decoded.response)
        })
    };

    let state = InvocationState::Completed {
        exit_code: status.code(),
        parsed: parsed.is_ok(),
    };
    tracing::debug!(invocation_id = %id, state = ?state, elapsed_ms = elapsed.as_millis() as u64, "Invocation finished");

    parsed.map_err(|violation| {
        let raw = stdout.lossy();
        let excerpt: String = raw.chars().take(STDOUT_EXCERPT).collect();
        tracing::error!(
            invocation_id = %id,
            route = %route,
            violation = %violation,
            stdout = %excerpt,
            stderr = %stderr,
            "Route broke the response protocol"
        );
        DispatchError::Protocol {
            violation,
            stdout: excerpt,
            stderr,
        }
    })
}

fn validate_headers(response: &ResponseEnvelope) -> Result<(), ProtocolViolation> {
    for (name, value) in &response.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            return Err(ProtocolViolation::Header(name.clone()));
        }
    }
    Ok(())
}
