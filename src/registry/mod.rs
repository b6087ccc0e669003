//! Artifact registry subsystem.
//!
//! # Data Flow
//! ```text
//! Build (writer):
//!     compiled binary promoted into bin/<key>
//!     → record.rs writes routes/<key>.route (temp file + rename)
//!
//! Serve (reader):
//!     table.rs scans routes/**.route at startup
//!     → ArcSwap<RouteTable> snapshot per request
//!     → watcher.rs sees marker changes → full rescan → atomic swap
//! ```
//!
//! # Design Decisions
//! - Binary written before marker, marker removed before binary, so a marker
//!   never points at a missing binary because of the build itself
//! - Markers live beside bin/, never inside it
//! - The resolver never scans the filesystem per request

pub mod layout;
pub mod record;
pub mod table;
pub mod watcher;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use layout::ArtifactLayout;
pub use record::{now_millis, remove_marker, write_marker, ArtifactRecord};
pub use table::{Registry, RouteTable};
pub use watcher::RegistryWatcher;

/// Errors reading or writing registry state.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed marker {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode marker: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("marker binary path '{0}' escapes the build directory")]
    UnsafeBinary(String),

    #[error("{0} is not a marker file")]
    NotAMarker(PathBuf),

    #[error("failed to walk markers: {0}")]
    Walk(String),
}

impl RegistryError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
