//! Compiler adapter subsystem.
//!
//! # Data Flow
//! ```text
//! RouteSourceUnit + BuildMode
//!     → command.rs (substitute {source}/{output}, run toolchain)
//!     → tmp/<key>-<uuid> written by the toolchain
//!     → on exit 0: chmod +x, rename into bin/<key>
//!     → ArtifactRecord
//! ```
//!
//! # Design Decisions
//! - The toolchain only ever writes to scratch space; the final path is
//!   reached by rename, so a half-written binary is never visible
//! - Diagnostics are captured, never streamed to the terminal
//! - `Compiler` is a trait so the orchestrator can run against test doubles

pub mod command;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::build::source::RouteSourceUnit;
use crate::config::BuildMode;
use crate::registry::ArtifactRecord;

pub use command::CommandCompiler;

/// Turns one route source unit into one executable artifact.
pub trait Compiler: Send + Sync {
    fn compile(&self, unit: &RouteSourceUnit, mode: BuildMode) -> Result<ArtifactRecord, CompileError>;
}

/// Failure to build one unit.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to start toolchain '{program}': {source}")]
    Toolchain {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("toolchain exited with {status}")]
    Failed { status: String, diagnostics: String },

    #[error("toolchain timed out after {0:?}")]
    TimedOut(Duration),

    #[error("toolchain succeeded but produced no artifact at {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// Captured toolchain output, when there is any.
    pub fn diagnostics(&self) -> &str {
        match self {
            CompileError::Failed { diagnostics, .. } => diagnostics,
            _ => "",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
