//! Route lookup.
//!
//! # Responsibilities
//! - Refuse traversal paths before touching the registry
//! - Look up the normalized path in the current registry snapshot
//! - Refuse records whose binary is gone or not executable
//!
//! # Design Decisions
//! - Read-only: resolution never builds, writes or scans
//! - Deterministic: same snapshot + same path → same answer
//! - Explicit errors rather than a silent default route

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::registry::{ArtifactRecord, Registry};
use crate::routing::path::{normalize, PathError};

/// Why a request path did not resolve to a dispatchable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("rejected path {path}: {reason}")]
    Rejected { path: String, reason: PathError },

    #[error("no route for {0}")]
    NotFound(String),

    #[error("route {route} has no executable at {}", binary.display())]
    NotDispatchable { route: String, binary: PathBuf },
}

/// Maps request paths to artifact records.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<Registry>,
}

impl Resolver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Resolve a request path to its artifact.
    pub fn resolve(&self, url_path: &str) -> Result<ArtifactRecord, ResolveError> {
        let route = normalize(url_path).map_err(|reason| ResolveError::Rejected {
            path: url_path.to_string(),
            reason,
        })?;

        let table = self.registry.snapshot();
        let record = table
            .get(&route)
            .ok_or_else(|| ResolveError::NotFound(route.clone()))?;

        if !record.is_dispatchable() {
            return Err(ResolveError::NotDispatchable {
                route,
                binary: record.binary.clone(),
            });
        }

        if !record.binary.starts_with(self.registry.layout().bin_dir()) {
            return Err(ResolveError::NotDispatchable {
                route,
                binary: record.binary.clone(),
            });
        }

        Ok(record.clone())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::BuildMode;
    use crate::registry::{write_marker, ArtifactLayout};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn install(layout: &ArtifactLayout, key: &str, route: &str) {
        let binary = layout.binary_path(key);
        fs::create_dir_all(binary.parent().unwrap()).unwrap();
        fs::write(&binary, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
        write_marker(
            layout,
            &ArtifactRecord {
                route: route.into(),
                key: key.into(),
                binary,
                source: PathBuf::from(format!("/src/{key}.rs")),
                built_at_ms: 1,
                mode: BuildMode::Debug,
            },
        )
        .unwrap();
    }

    fn resolver(dir: &TempDir, routes: &[(&str, &str)]) -> Resolver {
        let layout = ArtifactLayout::new(dir.path());
        for (key, route) in routes {
            install(&layout, key, route);
        }
        Resolver::new(Arc::new(Registry::load(layout).unwrap()))
    }

    const ROUTES: [(&str, &str); 4] = [
        ("index", "/"),
        ("about", "/about"),
        ("products/list", "/products/list"),
        ("products/index", "/products"),
    ];

    #[test]
    fn registered_paths_resolve_to_their_record() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &ROUTES);

        for (key, route) in ROUTES {
            let record = resolver.resolve(route).unwrap();
            assert_eq!(record.key, key);
            assert_eq!(record.route, route);
        }
        assert_eq!(resolver.resolve("/about/").unwrap().key, "about");
        assert_eq!(resolver.resolve("/products/").unwrap().key, "products/index");
    }

    #[test]
    fn unregistered_paths_are_not_found() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &ROUTES);

        for path in ["/index", "/contact", "/products/list/extra", "/products/index", "/About"] {
            assert!(
                matches!(resolver.resolve(path), Err(ResolveError::NotFound(_))),
                "{path} should not resolve"
            );
        }
    }

    #[test]
    fn traversal_never_resolves() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &ROUTES);

        for path in ["/../../etc/passwd", "/products/../about", "/%2e%2e/about"] {
            assert!(matches!(
                resolver.resolve(path),
                Err(ResolveError::Rejected { .. })
            ));
        }
    }

    #[test]
    fn missing_binary_is_not_dispatchable() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &ROUTES);
        fs::remove_file(resolver.registry().layout().binary_path("about")).unwrap();

        assert!(matches!(
            resolver.resolve("/about"),
            Err(ResolveError::NotDispatchable { .. })
        ));
    }

    #[test]
    fn resolution_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, &ROUTES);
        for _ in 0..3 {
            assert_eq!(resolver.resolve("/products/list").unwrap().key, "products/list");
            assert_eq!(
                resolver.resolve("/missing"),
                Err(ResolveError::NotFound("/missing".into()))
            );
        }
    }
}
