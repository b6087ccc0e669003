//! Artifact records and their marker files.
//!
//! A marker is a small TOML document naming the route, where its binary is
//! and when it was built. Markers are written atomically (temp file + rename)
//! and always after the binary they point at.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::BuildMode;
use crate::registry::layout::ArtifactLayout;
use crate::registry::RegistryError;

/// One compiled route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    /// Logical route path (`/`, `/about`, `/products/list`).
    pub route: String,
    /// Route key naming the binary and marker files.
    pub key: String,
    /// Absolute binary location.
    pub binary: PathBuf,
    /// Source unit the binary was built from.
    pub source: PathBuf,
    pub built_at_ms: u64,
    pub mode: BuildMode,
}

impl ArtifactRecord {
    /// True when the binary exists and can be executed.
    pub fn is_dispatchable(&self) -> bool {
        let Ok(meta) = fs::metadata(&self.binary) else {
            return false;
        };
        if !meta.is_file() {
            return false;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode() & 0o111 != 0
        }
        #[cfg(not(unix))]
        {
            true
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Marker {
    route: String,
    binary: String,
    source: PathBuf,
    built_at_ms: u64,
    mode: BuildMode,
}

/// Milliseconds since the Unix epoch for a timestamp.
pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub fn now_millis() -> u64 {
    epoch_millis(SystemTime::now())
}

/// Write (or replace) the marker for a record.
pub fn write_marker(layout: &ArtifactLayout, record: &ArtifactRecord) -> Result<(), RegistryError> {
    let marker = Marker {
        route: record.route.clone(),
        binary: layout.relative_binary(&record.key),
        source: record.source.clone(),
        built_at_ms: record.built_at_ms,
        mode: record.mode,
    };
    let text = toml::to_string(&marker)?;

    let path = layout.marker_path(&record.key);
    let dir = path.parent().unwrap_or(layout.root());
    fs::create_dir_all(dir).map_err(|e| RegistryError::io(dir, e))?;

    let staging = dir.join(format!(".marker-{}.tmp", uuid::Uuid::new_v4().simple()));
    fs::write(&staging, text).map_err(|e| RegistryError::io(&staging, e))?;
    if let Err(e) = fs::rename(&staging, &path) {
        let _ = fs::remove_file(&staging);
        return Err(RegistryError::io(&path, e));
    }
    Ok(())
}

/// Read one marker file.
pub fn read_marker(layout: &ArtifactLayout, path: &Path) -> Result<ArtifactRecord, RegistryError> {
    let key = layout
        .key_for_marker(path)
        .ok_or_else(|| RegistryError::NotAMarker(path.to_path_buf()))?;
    let text = fs::read_to_string(path).map_err(|e| RegistryError::io(path, e))?;
    let marker: Marker = toml::from_str(&text).map_err(|source| RegistryError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let relative = Path::new(&marker.binary);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(RegistryError::UnsafeBinary(marker.binary));
    }

    Ok(ArtifactRecord {
        route: marker.route,
        key,
        binary: layout.root().join(marker.binary),
        source: marker.source,
        built_at_ms: marker.built_at_ms,
        mode: marker.mode,
    })
}

/// Remove a marker; a missing marker is not an error.
pub fn remove_marker(layout: &ArtifactLayout, key: &str) -> Result<(), RegistryError> {
    let path = layout.marker_path(key);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RegistryError::io(&path, e)),
    }
}
