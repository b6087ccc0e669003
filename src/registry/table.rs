//! In-memory route table with atomic replacement.
//!
//! # Design Decisions
//! - Readers take an `Arc<RouteTable>` snapshot per request; no locks on the
//!   hot path
//! - Reloads and single-route upserts build a new table and swap it in whole
//! - A marker that fails to parse is skipped (and logged), not fatal

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use walkdir::WalkDir;

use crate::registry::layout::ArtifactLayout;
use crate::registry::record::{read_marker, ArtifactRecord};
use crate::registry::RegistryError;

/// Immutable snapshot: logical route path → record.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: BTreeMap<String, ArtifactRecord>,
}

impl RouteTable {
    pub fn get(&self, route: &str) -> Option<&ArtifactRecord> {
        self.routes.get(route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArtifactRecord> {
        self.routes.values()
    }

    fn insert(&mut self, record: ArtifactRecord) -> Option<ArtifactRecord> {
        self.routes.insert(record.route.clone(), record)
    }

    /// Scan every marker under the layout.
    pub fn scan(layout: &ArtifactLayout) -> Result<Self, RegistryError> {
        let mut table = RouteTable::default();
        let dir = layout.markers_dir();
        if !dir.exists() {
            return Ok(table);
        }

        let mut markers: Vec<_> = Vec::new();
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|e| RegistryError::Walk(e.to_string()))?;
            if entry.file_type().is_file() && layout.key_for_marker(entry.path()).is_some() {
                markers.push(entry.into_path());
            }
        }
        markers.sort();

        for path in markers {
            match read_marker(layout, &path) {
                Ok(record) => {
                    if let Some(previous) = table.insert(record) {
                        tracing::warn!(
                            route = %previous.route,
                            replaced_key = %previous.key,
                            "Two markers claim the same route"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(marker = %path.display(), error = %e, "Skipping unreadable marker");
                }
            }
        }
        Ok(table)
    }
}

/// Shared, swappable view of the artifact registry.
pub struct Registry {
    layout: ArtifactLayout,
    table: ArcSwap<RouteTable>,
}

impl Registry {
    /// A registry with no routes.
    pub fn empty(layout: ArtifactLayout) -> Self {
        Self {
            layout,
            table: ArcSwap::from_pointee(RouteTable::default()),
        }
    }

    /// Load the registry from the markers on disk.
    pub fn load(layout: ArtifactLayout) -> Result<Self, RegistryError> {
        let table = RouteTable::scan(&layout)?;
        tracing::info!(routes = table.len(), build_dir = %layout.root().display(), "Registry loaded");
        Ok(Self {
            layout,
            table: ArcSwap::from_pointee(table),
        })
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Current snapshot of the route table.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// Re-scan markers and swap the table in. Returns the new route count.
    pub fn reload(&self) -> Result<usize, RegistryError> {
        let table = RouteTable::scan(&self.layout)?;
        let count = table.len();
        self.table.store(Arc::new(table));
        tracing::info!(routes = count, "Registry reloaded");
        Ok(count)
    }

    /// Replace one route's record.
    pub fn upsert(&self, record: ArtifactRecord) {
        self.table.rcu(|current| {
            let mut next = RouteTable::clone(current);
            next.insert(record.clone());
            next
        });
    }
}
