//! On-disk layout of the build directory.
//!
//! ```text
//! <build_dir>/bin/<key>            compiled binary
//! <build_dir>/routes/<key>.route   marker
//! <build_dir>/tmp/                 compiler scratch space
//! ```

use std::path::{Path, PathBuf};

pub const MARKER_EXTENSION: &str = "route";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: build_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn markers_dir(&self) -> PathBuf {
        self.root.join("routes")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn binary_path(&self, key: &str) -> PathBuf {
        self.bin_dir().join(key)
    }

    /// Binary location relative to the build root, as stored in markers.
    pub fn relative_binary(&self, key: &str) -> String {
        format!("bin/{}", key)
    }

    pub fn marker_path(&self, key: &str) -> PathBuf {
        self.markers_dir().join(format!("{}.{}", key, MARKER_EXTENSION))
    }

    /// Scratch output for one compile, unique per invocation.
    pub fn temp_output(&self, key: &str) -> PathBuf {
        let flat = key.replace('/', "__");
        self.tmp_dir()
            .join(format!("{}-{}", flat, uuid::Uuid::new_v4().simple()))
    }

    /// Route key for a marker file, if the path is a marker under this layout.
    pub fn key_for_marker(&self, marker: &Path) -> Option<String> {
        if marker.extension()? != MARKER_EXTENSION {
            return None;
        }
        let relative = marker.strip_prefix(self.markers_dir()).ok()?;
        let stem = relative.with_extension("");
        let parts: Vec<&str> = stem
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}
