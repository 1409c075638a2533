// Conflict detection: watch toggling and external change notifications.
//
// A notification only raises `has_file_changed`; it never reloads. Only a
// successful full read clears the flag.

use std::sync::Arc;

use gridsync_common::types::{FileChangeEvent, FileChangeType};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Panel, WatchOutcome};
use crate::store::TabularStore;

impl<S: TabularStore> Panel<S> {
    /// Start or stop store-side watching of the open file.
    ///
    /// The flag only flips once the store has accepted the request; on
    /// failure it keeps its old value and the error is surfaced.
    pub async fn toggle_watch(&self) -> WatchOutcome {
        let (path, enable) = {
            let state = self.state();
            match &state.view.file_path {
                Some(path) => (path.clone(), !state.view.watch_enabled),
                None => return WatchOutcome::NoFile,
            }
        };

        let result = self.call(self.store.watch(path.clone(), enable)).await;

        let mut state = self.state();
        match result {
            Ok(()) => {
                if state.view.file_path.as_ref() == Some(&path) {
                    state.view.watch_enabled = enable;
                }
                state.view.error = None;
                info!(panel = %self.panel_id, path = %path.display(), enable, "watch toggled");
                if enable {
                    WatchOutcome::Watching
                } else {
                    WatchOutcome::Stopped
                }
            }
            Err(e) => {
                warn!(
                    panel = %self.panel_id,
                    path = %path.display(),
                    error = %e,
                    "watch request failed"
                );
                state.view.error = Some(e.to_string());
                WatchOutcome::Failed(e)
            }
        }
    }

    /// React to a change notification. Returns whether the panel is now
    /// flagged as diverged.
    pub fn handle_file_change(&self, event: &FileChangeEvent) -> bool {
        let mut state = self.state();
        let view = &mut state.view;
        if view.file_path.as_deref() != Some(event.path.as_path()) {
            debug!(
                panel = %self.panel_id,
                path = %event.path.display(),
                "change for another file ignored"
            );
            return view.has_file_changed;
        }
        // A checksum we already hold is our own write echoing back.
        let known = event.change_type == FileChangeType::Modified
            && event.new_checksum.is_some()
            && event.new_checksum == view.checksum;
        if !known {
            info!(
                panel = %self.panel_id,
                path = %event.path.display(),
                change = ?event.change_type,
                "open file changed externally"
            );
            view.has_file_changed = true;
        }
        view.has_file_changed
    }

    /// Forward the store's change notifications into `handle_file_change`
    /// until the panel is dropped or the store goes away.
    pub fn spawn_change_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.store.subscribe();
        let panel = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let received = changes.recv().await;
                let Some(panel) = panel.upgrade() else { break };
                match received {
                    Ok(event) => {
                        panel.handle_file_change(&event);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Whatever was missed may have been ours.
                        warn!(panel = %panel.panel_id, missed, "change listener lagged");
                        let mut state = panel.state();
                        if state.view.file_path.is_some() {
                            state.view.has_file_changed = true;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("change listener stopped");
        })
    }
}
