//! Marker directory watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::registry::layout::MARKER_EXTENSION;

/// A watcher that signals when route markers change on disk.
pub struct RegistryWatcher {
    markers_dir: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl RegistryWatcher {
    /// Create a new RegistryWatcher.
    ///
    /// Returns the watcher and a receiver that yields once per relevant change.
    pub fn new(markers_dir: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                markers_dir: markers_dir.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        std::fs::create_dir_all(&self.markers_dir)?;
        let tx = self.change_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_marker = event
                        .paths
                        .iter()
                        .any(|p| p.extension().is_some_and(|ext| ext == MARKER_EXTENSION));
                    let relevant = event.kind.is_create()
                        || event.kind.is_modify()
                        || event.kind.is_remove();
                    if relevant && touches_marker {
                        tracing::debug!(paths = ?event.paths, "Marker change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.markers_dir, RecursiveMode::Recursive)?;

        tracing::info!(path = ?self.markers_dir, "Registry watcher started");
        Ok(watcher)
    }
}
