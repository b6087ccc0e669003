//! Development-mode rebuild-before-dispatch.
//!
//! # Responsibilities
//! - Compare a route's source mtime against its binary's build time
//! - Rebuild stale (or never-built) routes before they are resolved
//! - Publish the new record into the live registry
//!
//! # Design Decisions
//! - Only constructed when config says development + rebuild_on_stale
//! - One rebuild per route at a time; concurrent requests wait on it
//! - Compilation runs on the blocking pool

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::build::orchestrator::BuildOrchestrator;
use crate::build::source::RouteSourceUnit;
use crate::build::summary::BuildFailure;
use crate::compiler::Compiler;
use crate::config::BuildMode;
use crate::registry::record::epoch_millis;
use crate::registry::{ArtifactRecord, Registry};

/// True when the source changed after the binary was built.
pub fn is_stale(record: &ArtifactRecord, unit: &RouteSourceUnit) -> bool {
    epoch_millis(unit.modified) > record.built_at_ms
}

/// Rebuilds routes on demand and swaps them into the registry.
pub struct Rebuilder<C> {
    orchestrator: Arc<BuildOrchestrator<C>>,
    registry: Arc<Registry>,
    mode: BuildMode,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<C: Compiler + 'static> Rebuilder<C> {
    pub fn new(orchestrator: Arc<BuildOrchestrator<C>>, registry: Arc<Registry>, mode: BuildMode) -> Self {
        Self {
            orchestrator,
            registry,
            mode,
            locks: DashMap::new(),
        }
    }

    /// Make sure the route at `route` (already normalized) is fresh.
    ///
    /// Returns `Ok(true)` when a rebuild happened. A route without a source
    /// unit is left alone.
    pub async fn refresh(&self, route: &str) -> Result<bool, BuildFailure> {
        let Some(unit) = self.orchestrator.sources().unit_for_route(route) else {
            return Ok(false);
        };

        let lock = self
            .locks
            .entry(unit.route.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another request may have rebuilt it while we waited.
        if let Some(current) = self.registry.snapshot().get(&unit.route) {
            if current.key == unit.key && current.is_dispatchable() && !is_stale(current, &unit) {
                return Ok(false);
            }
        }

        tracing::info!(route = %unit.route, source = %unit.path.display(), "Rebuilding stale route");
        let orchestrator = Arc::clone(&self.orchestrator);
        let mode = self.mode;
        let job_unit = unit.clone();
        let record = tokio::task::spawn_blocking(move || orchestrator.build_unit(&job_unit, mode))
            .await
            .map_err(|e| BuildFailure {
                route: unit.route.clone(),
                key: unit.key.clone(),
                source: unit.path.clone(),
                reason: format!("rebuild task failed: {}", e),
                diagnostics: String::new(),
            })??;

        self.registry.upsert(record);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn unit_modified(at: SystemTime) -> RouteSourceUnit {
        RouteSourceUnit {
            key: "about".into(),
            route: "/about".into(),
            path: PathBuf::from("/src/about.rs"),
            modified: at,
        }
    }

    fn record_built(at: SystemTime) -> ArtifactRecord {
        ArtifactRecord {
            route: "/about".into(),
            key: "about".into(),
            binary: PathBuf::from("/b/bin/about"),
            source: PathBuf::from("/src/about.rs"),
            built_at_ms: epoch_millis(at),
            mode: BuildMode::Debug,
        }
    }

    #[test]
    fn newer_source_is_stale() {
        let built = SystemTime::now();
        let record = record_built(built);
        assert!(is_stale(&record, &unit_modified(built + Duration::from_secs(2))));
        assert!(!is_stale(&record, &unit_modified(built)));
        assert!(!is_stale(&record, &unit_modified(built - Duration::from_secs(60))));
    }
}
