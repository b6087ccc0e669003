//! Build subsystem.
//!
//! # Data Flow
//! ```text
//! source root
//!     → source.rs (enumerate units, derive keys and routes)
//!     → orchestrator.rs (clean / prune, per-unit compile)
//!         → compiler (binary promoted into bin/)
//!         → registry marker written
//!     → summary.rs (total / succeeded / failed + diagnostics)
//!
//! Development serving:
//!     request route → freshness.rs (source newer than binary?)
//!     → orchestrator.build_unit → registry.upsert (atomic swap)
//! ```

pub mod freshness;
pub mod orchestrator;
pub mod source;
pub mod summary;

use std::path::PathBuf;

use thiserror::Error;

use crate::registry::RegistryError;

pub use freshness::{is_stale, Rebuilder};
pub use orchestrator::{BuildOptions, BuildOrchestrator};
pub use source::{RouteSourceUnit, SourceTree};
pub use summary::{BuildFailure, BuildSummary};

/// Errors that stop a build before or between units.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("source root {} is not a directory", .0.display())]
    SourceRoot(PathBuf),

    #[error("failed to walk source tree: {0}")]
    Walk(String),

    #[error("no route unit matches target '{0}'")]
    UnknownTarget(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
