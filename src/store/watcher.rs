//! Flag file watcher for hot reload.
//!
//! # Data Flow
//! ```text
//! notify event (parent directory)
//!     → filter: events touching the flag file
//!     → read_document (invalid documents are logged and skipped)
//!     → mpsc channel
//!     → apply_updates: FlagStore::replace → configuration_change notification
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::eventing::{Notification, NotificationBus};
use crate::lifecycle::ShutdownSignal;
use crate::store::{read_document, FlagDocument, FlagStore};

/// Watches a flag definition file and emits each successfully parsed revision.
pub struct FlagWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<FlagDocument>,
}

impl FlagWatcher {
    /// Create a new watcher.
    ///
    /// Returns the watcher and a receiver for parsed flag documents.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<FlagDocument>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching in a background thread.
    ///
    /// The parent directory is watched so editors that replace the file
    /// by rename are still observed. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let file_name: Option<OsString> = path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create();
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !relevant || !touches_file {
                        return;
                    }

                    tracing::info!(path = ?path, "Flag file change detected, reloading");
                    match read_document(&path) {
                        Ok(document) => {
                            let _ = tx.send(document);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload flags; keeping current set");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Flag watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Flag watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded documents to the store and announce what changed.
///
/// Runs until the update channel closes or shutdown is signalled.
pub async fn apply_updates(
    store: Arc<FlagStore>,
    bus: Arc<NotificationBus>,
    mut updates: mpsc::UnboundedReceiver<FlagDocument>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let document = tokio::select! {
            next = updates.recv() => match next {
                Some(document) => document,
                None => break,
            },
            _ = shutdown.recv() => break,
        };

        let changes = store.replace(document);
        if changes.is_empty() {
            tracing::debug!("Flag file reloaded without changes");
            continue;
        }

        tracing::info!(changed = changes.len(), "Flag set updated");
        let delivered = bus
            .publish(Notification::configuration_change(changes.to_data()))
            .await;
        tracing::debug!(delivered, "Configuration change published");
    }
}
