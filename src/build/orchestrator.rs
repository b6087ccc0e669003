//! Build orchestration.
//!
//! # Responsibilities
//! - Enumerate units (all, or one target)
//! - Clean prior artifacts when asked
//! - Compile each unit and write its marker after its binary
//! - Keep going after a unit fails, unless fail-fast was requested
//!
//! # Design Decisions
//! - Removal order is marker, then binary; write order is binary, then marker
//! - Two units claiming one route: the first (by key) wins, the second fails
//! - A unit whose route needs percent-encoding fails without being compiled
//! - Full builds prune markers whose source unit no longer exists

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::build::source::{RouteSourceUnit, SourceTree};
use crate::build::summary::{BuildFailure, BuildSummary};
use crate::build::BuildError;
use crate::compiler::Compiler;
use crate::config::BuildMode;
use crate::observability::metrics;
use crate::registry::{remove_marker, write_marker, ArtifactLayout, ArtifactRecord, RegistryError};
use crate::routing::{is_addressable, normalize};

/// What to build and how.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// A logical path (`/products/list`) or route key (`products/list`).
    pub target: Option<String>,
    pub mode: BuildMode,
    pub clean: bool,
    pub fail_fast: bool,
}

/// Drives a compiler over a source tree and maintains the registry markers.
pub struct BuildOrchestrator<C> {
    compiler: C,
    sources: SourceTree,
    layout: ArtifactLayout,
}

impl<C: Compiler> BuildOrchestrator<C> {
    pub fn new(compiler: C, sources: SourceTree, layout: ArtifactLayout) -> Self {
        Self {
            compiler,
            sources,
            layout,
        }
    }

    pub fn sources(&self) -> &SourceTree {
        &self.sources
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Build every unit (or the targeted one) and summarize.
    pub fn build_all(&self, options: &BuildOptions) -> Result<BuildSummary, BuildError> {
        let started = Instant::now();
        let all_units = self.sources.units()?;

        let units = match &options.target {
            Some(target) => {
                let selected = select_target(&all_units, target);
                if selected.is_empty() {
                    return Err(BuildError::UnknownTarget(target.clone()));
                }
                selected
            }
            None => all_units,
        };

        tracing::info!(
            units = units.len(),
            mode = %options.mode,
            clean = options.clean,
            target = ?options.target,
            "Build starting"
        );

        if options.clean {
            if options.target.is_some() {
                for unit in &units {
                    self.remove_artifact(&unit.key)?;
                }
            } else {
                self.clean_all()?;
            }
        } else if options.target.is_none() {
            self.prune_stale(&units)?;
        }

        let mut summary = BuildSummary::default();
        let mut claimed: HashMap<String, String> = HashMap::new();

        for unit in &units {
            if !is_addressable(&unit.route) {
                let failure = failure(
                    unit,
                    format!("route '{}' cannot be requested without percent-encoding", unit.route),
                    String::new(),
                );
                tracing::error!(route = %unit.route, key = %unit.key, "Route name is not addressable");
                metrics::record_build_unit("rejected", Duration::ZERO);
                summary.record_failure(failure);
                if options.fail_fast {
                    break;
                }
                continue;
            }
            if let Some(owner) = claimed.get(&unit.route) {
                let failure = failure(unit, format!("route already provided by '{}'", owner), String::new());
                tracing::error!(route = %unit.route, key = %unit.key, owner = %owner, "Route conflict");
                metrics::record_build_unit("conflict", Duration::ZERO);
                summary.record_failure(failure);
                if options.fail_fast {
                    break;
                }
                continue;
            }
            claimed.insert(unit.route.clone(), unit.key.clone());

            match self.build_unit(unit, options.mode) {
                Ok(record) => summary.record_success(record),
                Err(failure) => {
                    summary.record_failure(failure);
                    if options.fail_fast {
                        tracing::warn!("Stopping build after first failure");
                        break;
                    }
                }
            }
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Build finished"
        );
        Ok(summary)
    }

    /// Compile one unit and publish its marker.
    pub fn build_unit(&self, unit: &RouteSourceUnit, mode: BuildMode) -> Result<ArtifactRecord, BuildFailure> {
        let started = Instant::now();

        let record = match self.compiler.compile(unit, mode) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(route = %unit.route, source = %unit.path.display(), error = %e, "Compile failed");
                metrics::record_build_unit("failed", started.elapsed());
                return Err(failure(unit, e.to_string(), e.diagnostics().to_string()));
            }
        };

        if let Err(e) = write_marker(&self.layout, &record) {
            tracing::error!(route = %unit.route, error = %e, "Failed to write marker");
            metrics::record_build_unit("failed", started.elapsed());
            return Err(failure(unit, e.to_string(), String::new()));
        }

        tracing::info!(
            route = %record.route,
            binary = %record.binary.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Route built"
        );
        metrics::record_build_unit("succeeded", started.elapsed());
        Ok(record)
    }

    /// Remove one route's marker, then its binary.
    fn remove_artifact(&self, key: &str) -> Result<(), BuildError> {
        remove_marker(&self.layout, key)?;
        remove_file_if_present(&self.layout.binary_path(key))?;
        Ok(())
    }

    fn clean_all(&self) -> Result<(), BuildError> {
        for key in self.marker_keys()? {
            remove_marker(&self.layout, &key)?;
        }
        for dir in [self.layout.bin_dir(), self.layout.tmp_dir()] {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(RegistryError::io(&dir, e).into()),
            }
        }
        tracing::info!(build_dir = %self.layout.root().display(), "Cleaned build output");
        Ok(())
    }

    fn prune_stale(&self, units: &[RouteSourceUnit]) -> Result<(), BuildError> {
        let live: HashSet<&str> = units.iter().map(|u| u.key.as_str()).collect();
        for key in self.marker_keys()? {
            if !live.contains(key.as_str()) {
                tracing::info!(key = %key, "Removing artifact for deleted source");
                self.remove_artifact(&key)?;
            }
        }
        Ok(())
    }

    fn marker_keys(&self) -> Result<Vec<String>, BuildError> {
        let dir = self.layout.markers_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|e| BuildError::Walk(e.to_string()))?;
            if let Some(key) = self.layout.key_for_marker(entry.path()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn select_target(units: &[RouteSourceUnit], target: &str) -> Vec<RouteSourceUnit> {
    let as_route = normalize(target).ok();
    units
        .iter()
        .filter(|u| u.key == target || as_route.as_deref() == Some(u.route.as_str()))
        .cloned()
        .collect()
}

fn failure(unit: &RouteSourceUnit, reason: String, diagnostics: String) -> BuildFailure {
    BuildFailure {
        route: unit.route.clone(),
        key: unit.key.clone(),
        source: unit.path.clone(),
        reason,
        diagnostics,
    }
}

fn remove_file_if_present(path: &Path) -> Result<(), RegistryError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RegistryError::io(path, e)),
    }
}
