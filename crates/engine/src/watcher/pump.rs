// Change pump: raw FS event → debounce → checksum → FileChangeEvent.
//
// Connects the watcher stages for one file into a single async loop that
// turns OS notifications into store change notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use gridsync_common::types::{FileChangeEvent, FileChangeType};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use super::debounce::{DebounceConfig, Debouncer};
use super::hash;
use super::{FsEventKind, RawFsEvent};

/// Last known checksum per file.
///
/// The file store records the checksum of every file it reads or writes, so
/// the pump can tell its own writes (checksum already known) apart from
/// external edits.
#[derive(Debug, Default)]
pub struct ChecksumRegistry {
    known: StdMutex<HashMap<PathBuf, hash::Checksum>>,
}

impl ChecksumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &Path, checksum: &str) {
        let mut guard = self.known.lock().expect("checksum registry lock poisoned");
        guard.insert(path.to_path_buf(), checksum.to_string());
    }

    pub fn get(&self, path: &Path) -> Option<hash::Checksum> {
        let guard = self.known.lock().expect("checksum registry lock poisoned");
        guard.get(path).cloned()
    }

    pub fn forget(&self, path: &Path) {
        let mut guard = self.known.lock().expect("checksum registry lock poisoned");
        guard.remove(path);
    }
}

#[derive(Debug, Clone)]
pub struct PumpConfig {
    pub debounce: DebounceConfig,
    /// How often to check the debouncer for ready events.
    pub poll_interval: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self { debounce: DebounceConfig::default(), poll_interval: Duration::from_millis(50) }
    }
}

/// Runs the change pump for `path` until `raw_rx` closes or `shutdown` fires.
///
/// Every raw event is attributed to `path` (the path the caller watches),
/// whatever spelling the OS reported.
pub async fn run_change_pump(
    path: PathBuf,
    mut raw_rx: mpsc::Receiver<RawFsEvent>,
    changes: broadcast::Sender<FileChangeEvent>,
    registry: std::sync::Arc<ChecksumRegistry>,
    config: PumpConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut debouncer = Debouncer::new(config.debounce);

    info!(path = %path.display(), "change pump started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!(path = %path.display(), "change pump shutting down");
                break;
            }

            maybe_event = raw_rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        trace!(
                            reported = %event.path.display(),
                            kind = ?event.kind,
                            "raw event received"
                        );
                        debouncer.record(event.kind);
                    }
                    None => {
                        info!(path = %path.display(), "raw event channel closed, pump exiting");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep(config.poll_interval), if debouncer.is_pending() => {}
        }

        let Some(settled) = debouncer.take_settled() else {
            continue;
        };
        let Some(change) = process_event(&path, &settled.kind, &registry) else {
            trace!(path = %path.display(), events = settled.events, "no-op (checksum unchanged)");
            continue;
        };
        debug!(
            path = %change.path.display(),
            change = ?change.change_type,
            events = settled.events,
            "file change detected"
        );
        // No receivers is fine: nobody is listening right now.
        let _ = changes.send(change);
    }
}

/// Turn one settled burst into a change notification, if anything changed.
fn process_event(
    path: &Path,
    kind: &FsEventKind,
    registry: &ChecksumRegistry,
) -> Option<FileChangeEvent> {
    match std::fs::read(path) {
        Ok(content) => {
            // Whatever the raw kind, the file is there now: compare content.
            let previous = registry.get(path);
            let checksum = hash::changed_checksum(previous.as_deref(), &content)?;
            registry.record(path, &checksum);
            Some(FileChangeEvent {
                path: path.to_path_buf(),
                change_type: FileChangeType::Modified,
                new_checksum: Some(checksum),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            registry.forget(path);
            let change_type = match kind {
                FsEventKind::RenameAway => FileChangeType::Renamed,
                FsEventKind::Modify | FsEventKind::Remove => FileChangeType::Deleted,
            };
            Some(FileChangeEvent { path: path.to_path_buf(), change_type, new_checksum: None })
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read changed file");
            None
        }
    }
}
