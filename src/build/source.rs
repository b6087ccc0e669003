//! Route source enumeration.
//!
//! # Responsibilities
//! - Walk the source root for files with the configured extension
//! - Derive each unit's route key and logical path
//! - Find the unit behind a single route (development rebuilds)
//!
//! # Design Decisions
//! - Hidden files and directories are never units
//! - Units are sorted by key so builds are deterministic

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::{DirEntry, WalkDir};

use crate::build::BuildError;
use crate::config::CompilerConfig;
use crate::routing::logical_path;

/// One source file = one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSourceUnit {
    /// Relative path without extension, `/`-separated.
    pub key: String,
    /// Logical route path.
    pub route: String,
    /// Source file location.
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// The tree of route sources under one root.
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    extension: String,
    index_name: String,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

impl SourceTree {
    pub fn new(root: impl Into<PathBuf>, compiler: &CompilerConfig) -> Self {
        Self {
            root: root.into(),
            extension: compiler.source_extension.clone(),
            index_name: compiler.index_name.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every unit under the root, sorted by key.
    pub fn units(&self) -> Result<Vec<RouteSourceUnit>, BuildError> {
        if !self.root.is_dir() {
            return Err(BuildError::SourceRoot(self.root.clone()));
        }

        let mut units = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        for entry in walker {
            let entry = entry.map_err(|e| BuildError::Walk(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(unit) = self.unit_at(entry.path()) {
                units.push(unit);
            }
        }
        units.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(units)
    }

    /// The unit serving a normalized route path, if its source exists.
    ///
    /// A plain unit (`about.rs`) wins over an index unit (`about/index.rs`).
    pub fn unit_for_route(&self, route: &str) -> Option<RouteSourceUnit> {
        let relative = route.trim_start_matches('/');
        let candidates = if relative.is_empty() {
            vec![self.index_name.clone()]
        } else {
            vec![
                relative.to_string(),
                format!("{}/{}", relative, self.index_name),
            ]
        };

        candidates.into_iter().find_map(|key| {
            let path = self.root.join(format!("{}.{}", key, self.extension));
            if path.is_file() {
                self.unit_at(&path)
            } else {
                None
            }
        })
    }

    fn unit_at(&self, path: &Path) -> Option<RouteSourceUnit> {
        if path.extension()? != self.extension.as_str() {
            return None;
        }
        let relative = path.strip_prefix(&self.root).ok()?.with_extension("");
        let segments: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        if segments.iter().any(|s| s.starts_with('.')) {
            return None;
        }
        let key = segments.join("/");
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;

        Some(RouteSourceUnit {
            route: logical_path(&key, &self.index_name),
            key,
            path: path.to_path_buf(),
            modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[&str]) -> (TempDir, SourceTree) {
        let dir = TempDir::new().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "fn main() {}").unwrap();
        }
        let tree = SourceTree::new(dir.path(), &CompilerConfig::default());
        (dir, tree)
    }

    #[test]
    fn units_follow_the_tree() {
        let (_dir, tree) = tree(&[
            "index.rs",
            "about.rs",
            "products/list.rs",
            "products/index.rs",
            "notes.txt",
            ".hidden/secret.rs",
            "products/.draft.rs",
        ]);

        let units = tree.units().unwrap();
        let pairs: Vec<(&str, &str)> = units
            .iter()
            .map(|u| (u.key.as_str(), u.route.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("about", "/about"),
                ("index", "/"),
                ("products/index", "/products"),
                ("products/list", "/products/list"),
            ]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let tree = SourceTree::new("/definitely/not/here", &CompilerConfig::default());
        assert!(matches!(tree.units(), Err(BuildError::SourceRoot(_))));
    }

    #[test]
    fn unit_for_route_prefers_plain_unit() {
        let (_dir, tree) = tree(&["index.rs", "about.rs", "about/index.rs", "shop/index.rs"]);

        assert_eq!(tree.unit_for_route("/").unwrap().key, "index");
        assert_eq!(tree.unit_for_route("/about").unwrap().key, "about");
        assert_eq!(tree.unit_for_route("/shop").unwrap().key, "shop/index");
        assert!(tree.unit_for_route("/contact").is_none());
    }
}
