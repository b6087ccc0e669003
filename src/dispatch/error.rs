//! Dispatch error taxonomy.
//!
//! | Error         | Meaning                                 | HTTP |
//! |---------------|-----------------------------------------|------|
//! | `Spawn`       | OS could not start the route process    | 500  |
//! | `Protocol`    | exit 0 but output is not a response     | 502  |
//! | `NonZeroExit` | route process failed or was signalled   | 502  |
//! | `Timeout`     | deadline passed, process killed         | 504  |
//! | `Overloaded`  | no process slot within the deadline     | 503  |
//! | `Io`          | pipe or wait failure                    | 500  |

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Why a route's output could not be read as a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("route produced no output")]
    EmptyOutput,

    #[error("output is not UTF-8")]
    NotUtf8,

    #[error("response line is not Base64: {0}")]
    Base64(String),

    #[error("response is not a valid envelope: {0}")]
    Json(String),

    #[error("status {0} is out of range")]
    Status(u16),

    #[error("invalid response header '{0}'")]
    Header(String),

    #[error("output exceeded {0} bytes")]
    OutputTooLarge(usize),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to spawn {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol violation: {violation}")]
    Protocol {
        violation: ProtocolViolation,
        stdout: String,
        stderr: String,
    },

    #[error("route exited with {}", exit_label(*code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("route timed out after {elapsed:?}")]
    Timeout { elapsed: Duration, stderr: String },

    #[error("no process slot available within {0:?}")]
    Overloaded(Duration),

    #[error("I/O error talking to route: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

impl DispatchError {
    /// Status the client sees.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Spawn { .. } | DispatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Protocol { .. } | DispatchError::NonZeroExit { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short label for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            DispatchError::Spawn { .. } => "spawn_failed",
            DispatchError::Protocol { .. } => "protocol_error",
            DispatchError::NonZeroExit { .. } => "nonzero_exit",
            DispatchError::Timeout { .. } => "timed_out",
            DispatchError::Overloaded(_) => "overloaded",
            DispatchError::Io(_) => "io_error",
        }
    }

    /// Captured standard error, for the operator log.
    pub fn stderr(&self) -> &str {
        match self {
            DispatchError::Protocol { stderr, .. }
            | DispatchError::NonZeroExit { stderr, .. }
            | DispatchError::Timeout { stderr, .. } => stderr,
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let protocol = DispatchError::Protocol {
            violation: ProtocolViolation::EmptyOutput,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(protocol.status_code(), StatusCode::BAD_GATEWAY);

        let timeout = DispatchError::Timeout {
            elapsed: Duration::from_secs(1),
            stderr: "slow".into(),
        };
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.stderr(), "slow");

        let spawn = DispatchError::Spawn {
            binary: PathBuf::from("/b/bin/x"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(spawn.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(spawn.outcome(), "spawn_failed");

        let exit = DispatchError::NonZeroExit { code: None, stderr: String::new() };
        assert_eq!(exit.to_string(), "route exited with a signal");
    }
}
