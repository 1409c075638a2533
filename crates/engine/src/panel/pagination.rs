// Chunked reads into the panel window.
//
// Full reads (open, select_sheet, set_range, refresh) replace the window and
// bump the read generation. `load_more` appends the next chunk and is
// single-flight. A result whose generation is no longer current is dropped.

use std::path::{Path, PathBuf};

use chrono::Utc;
use gridsync_common::types::{CellEdit, ReadRequest, ReadResult};
use tracing::{debug, info, warn};

use super::{LoadOutcome, Panel, PanelState};
use crate::store::{StoreError, TabularStore};

/// What a full read should load.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ReadTarget {
    pub path: PathBuf,
    pub sheet: Option<String>,
    pub range: Option<String>,
}

impl<S: TabularStore> Panel<S> {
    /// Open `path` (first sheet when `sheet` is `None`) and load the first
    /// chunk. Any pending edits are dropped.
    pub async fn open(&self, path: impl Into<PathBuf>, sheet: Option<String>) -> LoadOutcome {
        self.load(ReadTarget { path: path.into(), sheet, range: None }).await
    }

    /// Like `open`, narrowed to `range` (`A1:C10`) in the same read.
    pub async fn open_range(
        &self,
        path: impl Into<PathBuf>,
        sheet: Option<String>,
        range: Option<String>,
    ) -> LoadOutcome {
        self.load(ReadTarget { path: path.into(), sheet, range }).await
    }

    /// Switch to another sheet of the open file.
    pub async fn select_sheet(&self, sheet: impl Into<String>) -> LoadOutcome {
        let Some(path) = self.state().view.file_path.clone() else {
            return LoadOutcome::NoFile;
        };
        self.load(ReadTarget { path, sheet: Some(sheet.into()), range: None }).await
    }

    /// Restrict the window to `range` (`A1:C10`), or lift the restriction.
    pub async fn set_range(&self, range: Option<String>) -> LoadOutcome {
        let (path, sheet) = {
            let state = self.state();
            match state.view.file_path.clone() {
                Some(path) => (path, state.view.active_sheet.clone()),
                None => return LoadOutcome::NoFile,
            }
        };
        self.load(ReadTarget { path, sheet, range }).await
    }

    /// Re-read the active sheet from the top.
    ///
    /// Pending edits are discarded without confirmation; they come back in
    /// `LoadOutcome::Loaded::discarded_edits` so a caller can tell the user.
    pub async fn refresh(&self) -> LoadOutcome {
        let Some(target) = self.current_target() else {
            return LoadOutcome::NoFile;
        };
        self.load(target).await
    }

    pub(super) fn current_target(&self) -> Option<ReadTarget> {
        let state = self.state();
        let view = &state.view;
        view.file_path.clone().map(|path| ReadTarget {
            path,
            sheet: view.active_sheet.clone(),
            range: view.active_range.clone(),
        })
    }

    /// Full read: replace the window with the first chunk of `target`.
    pub(super) async fn load(&self, target: ReadTarget) -> LoadOutcome {
        let (generation, result) = self.read_first_chunk(&target).await;
        let (outcome, stale_watch) = {
            let mut state = self.state();
            match self.install(&mut state, generation, &target, result) {
                Ok(outcome) => outcome,
                Err(outcome) => return outcome,
            }
        };

        // Watching follows the open file.
        if let Some(old) = stale_watch {
            if let Err(e) = self.call(self.store.watch(old.clone(), false)).await {
                warn!(
                    panel = %self.panel_id,
                    path = %old.display(),
                    error = %e,
                    "unwatch of previous file failed"
                );
            }
        }
        outcome
    }

    /// Issue a generation-tagged read of the first chunk.
    pub(super) async fn read_first_chunk(
        &self,
        target: &ReadTarget,
    ) -> (u64, Result<ReadResult, StoreError>) {
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.view.is_loading = true;
            state.generation
        };
        debug!(
            panel = %self.panel_id,
            path = %target.path.display(),
            sheet = ?target.sheet,
            generation,
            "reading first chunk"
        );
        let request = ReadRequest::new(target.path.clone())
            .sheet(target.sheet.clone())
            .range(target.range.clone())
            .page(0, self.settings.chunk_size);
        (generation, self.call(self.store.read(request)).await)
    }

    /// Install a full-read result. `Err` carries an outcome that leaves the
    /// window alone; `Ok` carries the outcome plus a previously watched path
    /// that should no longer be watched.
    pub(super) fn install(
        &self,
        state: &mut PanelState,
        generation: u64,
        target: &ReadTarget,
        result: Result<ReadResult, StoreError>,
    ) -> Result<(LoadOutcome, Option<PathBuf>), LoadOutcome> {
        if generation != state.generation {
            debug!(panel = %self.panel_id, generation, "dropping superseded read");
            return Err(LoadOutcome::Superseded);
        }
        let view = &mut state.view;
        view.is_loading = false;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    panel = %self.panel_id,
                    path = %target.path.display(),
                    error = %e,
                    "read failed"
                );
                view.error = Some(e.to_string());
                return Err(LoadOutcome::Failed(e));
            }
        };

        let same_file = view.file_path.as_ref() == Some(&target.path);
        let stale_watch = match (&view.file_path, view.watch_enabled) {
            (Some(old), true) if !same_file => {
                view.watch_enabled = false;
                Some(old.clone())
            }
            _ => None,
        };
        remember_recent(&mut view.recent_files, &target.path, self.settings.recent_files_limit);

        let discarded_edits: Vec<CellEdit> = view.pending_edits.take();
        if !discarded_edits.is_empty() {
            warn!(
                panel = %self.panel_id,
                discarded = discarded_edits.len(),
                "reload discarded pending edits"
            );
        }

        view.file_path = Some(target.path.clone());
        view.sheets = result.sheets;
        view.active_sheet = Some(result.sheet);
        view.active_range = target.range.clone();
        view.columns = result.columns;
        view.rows = result.rows;
        view.checksum = Some(result.checksum);
        view.total_rows = result.total_rows;
        view.offset = 0;
        view.has_more = result.has_more;
        view.size_info = Some(result.size_info);
        view.validation = None;
        view.last_sync_at = Some(Utc::now());
        view.has_file_changed = false;
        view.error = None;

        info!(
            panel = %self.panel_id,
            path = %target.path.display(),
            rows = view.rows.len(),
            total_rows = view.total_rows,
            "window loaded"
        );
        Ok((LoadOutcome::Loaded { discarded_edits }, stale_watch))
    }

    /// Append the next chunk after the loaded rows.
    pub async fn load_more(&self) -> LoadOutcome {
        let (generation, request) = {
            let mut state = self.state();
            let view = &state.view;
            let Some(path) = view.file_path.clone() else {
                return LoadOutcome::NoFile;
            };
            if view.is_loading || state.loading_more {
                return LoadOutcome::Skipped;
            }
            let next = view.next_fetch_offset();
            if next >= view.total_rows {
                return LoadOutcome::NothingMore;
            }
            let request = ReadRequest::new(path)
                .sheet(view.active_sheet.clone())
                .range(view.active_range.clone())
                .page(next, self.settings.chunk_size);
            state.loading_more = true;
            state.view.is_loading = true;
            (state.generation, request)
        };
        debug!(panel = %self.panel_id, offset = request.offset, "reading next chunk");

        let result = self.call(self.store.read(request)).await;

        let mut state = self.state();
        state.loading_more = false;
        if generation != state.generation {
            debug!(panel = %self.panel_id, generation, "dropping superseded page");
            return LoadOutcome::Superseded;
        }
        let view = &mut state.view;
        view.is_loading = false;

        match result {
            Ok(result) => {
                if view.checksum.as_deref() != Some(result.checksum.as_str()) {
                    // Pages from two file versions now share the window.
                    warn!(panel = %self.panel_id, "file changed between pages");
                    view.has_file_changed = true;
                }
                let appended = result.rows.len() as u32;
                view.rows.extend(result.rows);
                view.total_rows = result.total_rows;
                view.has_more = view.next_fetch_offset() < view.total_rows;
                view.error = None;
                debug!(panel = %self.panel_id, appended, loaded = view.rows.len(), "page appended");
                LoadOutcome::Appended { rows: appended }
            }
            Err(e) => {
                warn!(panel = %self.panel_id, error = %e, "page read failed");
                view.error = Some(e.to_string());
                LoadOutcome::Failed(e)
            }
        }
    }
}

/// Move `path` to the front of `recent`, without duplicates, capped at
/// `limit` entries.
fn remember_recent(recent: &mut Vec<PathBuf>, path: &Path, limit: usize) {
    recent.retain(|p| p.as_path() != path);
    recent.insert(0, path.to_path_buf());
    recent.truncate(limit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_files_move_to_front_and_cap() {
        let mut recent = vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")];
        remember_recent(&mut recent, Path::new("/b"), 3);
        assert_eq!(recent, vec![PathBuf::from("/b"), PathBuf::from("/a"), PathBuf::from("/c")]);

        remember_recent(&mut recent, Path::new("/d"), 3);
        assert_eq!(recent, vec![PathBuf::from("/d"), PathBuf::from("/b"), PathBuf::from("/a")]);
    }
}
