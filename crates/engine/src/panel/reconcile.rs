// Reconciliation: submit the edit buffer under a checksum precondition.
//
//   Clean ──add──▶ Dirty ──apply──▶ Applying ──accepted──▶ Clean
//                    ▲                  │
//                    └──rejected/error──┘
//
// Accepted batches are followed by a full re-read; the new window, the
// new checksum and the emptied buffer are installed under one lock.

use gridsync_common::types::ApplyRequest;
use tracing::{info, warn};

use super::pagination::ReadTarget;
use super::{ApplyOutcome, LoadOutcome, Panel};
use crate::store::TabularStore;

impl<S: TabularStore> Panel<S> {
    /// Submit every pending edit with the last synced checksum.
    ///
    /// All-or-nothing: on acceptance the buffer empties and the window is
    /// re-read; on rejection or a failed call the buffer and checksum stay
    /// exactly as they were.
    pub async fn apply_edits(&self) -> ApplyOutcome {
        let (request, target) = {
            let mut state = self.state();
            let view = &state.view;
            let (Some(path), Some(sheet)) = (view.file_path.clone(), view.active_sheet.clone())
            else {
                return ApplyOutcome::NoFile;
            };
            if view.is_applying {
                return ApplyOutcome::Busy;
            }
            if view.pending_edits.is_empty() {
                return ApplyOutcome::NothingToApply;
            }
            let request = ApplyRequest {
                path: path.clone(),
                sheet: sheet.clone(),
                edits: view.pending_edits.to_vec(),
                expected_checksum: view.checksum.clone(),
            };
            let target = ReadTarget { path, sheet: Some(sheet), range: view.active_range.clone() };
            state.view.is_applying = true;
            (request, target)
        };
        let submitted = request.edits.len();
        info!(panel = %self.panel_id, edits = submitted, "applying edits");

        let result = self.call(self.store.apply(request)).await;

        let result = match result {
            Ok(result) if result.success => result,
            Ok(result) => {
                let mut state = self.state();
                let view = &mut state.view;
                view.is_applying = false;
                view.error = Some(result.errors.join("; "));
                if view.checksum.as_deref() != Some(result.new_checksum.as_str()) {
                    view.has_file_changed = true;
                }
                warn!(panel = %self.panel_id, errors = ?result.errors, "apply rejected");
                return ApplyOutcome::Rejected {
                    errors: result.errors,
                    current_checksum: result.new_checksum,
                };
            }
            Err(e) => {
                let mut state = self.state();
                state.view.is_applying = false;
                state.view.error = Some(e.to_string());
                warn!(panel = %self.panel_id, error = %e, "apply failed");
                return ApplyOutcome::Failed(e);
            }
        };

        {
            let mut state = self.state();
            if state.view.file_path.as_ref() != Some(&target.path) {
                // Closed or switched files meanwhile; the open file owns the window.
                state.view.is_applying = false;
                info!(
                    panel = %self.panel_id,
                    edits_applied = result.edits_applied,
                    "edits applied to a file no longer open"
                );
                return ApplyOutcome::Applied {
                    edits_applied: result.edits_applied,
                    new_checksum: result.new_checksum,
                };
            }
        }

        // The edits are in the file now; pick up the result with a re-read.
        let (generation, read) = self.read_first_chunk(&target).await;
        let mut state = self.state();
        state.view.is_applying = false;
        if state.view.file_path.as_ref() != Some(&target.path) {
            if state.generation == generation {
                state.view.is_loading = false;
            }
            return ApplyOutcome::Applied {
                edits_applied: result.edits_applied,
                new_checksum: result.new_checksum,
            };
        }
        state.view.pending_edits.clear();
        match self.install(&mut state, generation, &target, read) {
            Ok(_) => {}
            Err(LoadOutcome::Failed(e)) => {
                // Applied but not re-read: keep the window, adopt the checksum.
                state.view.checksum = Some(result.new_checksum.clone());
                state.view.error = Some(format!("edits applied but refresh failed: {e}"));
            }
            Err(_) => {
                // A newer read owns the window and will bring its own checksum.
                state.view.checksum = Some(result.new_checksum.clone());
            }
        }
        info!(
            panel = %self.panel_id,
            edits_applied = result.edits_applied,
            "edits applied"
        );
        ApplyOutcome::Applied {
            edits_applied: result.edits_applied,
            new_checksum: result.new_checksum,
        }
    }
}
