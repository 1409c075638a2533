// Panel: one synchronization engine bound to at most one open file.
//
// The panel owns the view model (loaded window, checksum, edit buffer,
// validation results, flags) and talks to a `TabularStore`. Operations
// never return `Err`: failures land in the view's `error` field and in the
// returned outcome. The state lock is never held across a store call.
//
//   pagination  open / select_sheet / set_range / refresh / load_more
//   edits       the edit buffer
//   validation  schema attachment and validation
//   conflict    watch toggling and external change notifications
//   reconcile   apply_edits

pub mod conflict;
pub mod edits;
pub mod pagination;
pub mod reconcile;
pub mod validation;

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gridsync_common::address::CellRange;
use gridsync_common::cell::CellValue;
use gridsync_common::schema::SheetSchema;
use gridsync_common::types::{
    CellEdit, ColumnInfo, SheetInfo, SizeInfo, ValidationResult, DEFAULT_CHUNK_ROWS,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PanelConfig;
use crate::store::{StoreError, TabularStore};

pub use edits::EditBuffer;

/// Tunables for one panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSettings {
    /// Rows fetched per read.
    pub chunk_size: u32,
    /// Upper bound on every store call.
    pub request_timeout: Duration,
    pub recent_files_limit: usize,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_ROWS,
            request_timeout: Duration::from_secs(30),
            recent_files_limit: 10,
        }
    }
}

/// Snapshot of everything a panel shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelView {
    /// `None` when no file is open.
    pub file_path: Option<PathBuf>,
    pub sheets: Vec<SheetInfo>,
    pub active_sheet: Option<String>,
    pub active_range: Option<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub columns: Vec<ColumnInfo>,
    /// Checksum of the file at the last full sync.
    pub checksum: Option<String>,
    pub total_rows: u32,
    /// Position of the window's first row (relative to the active range).
    /// Stays put while `load_more` appends.
    pub offset: u32,
    pub has_more: bool,
    pub size_info: Option<SizeInfo>,
    pub schema: Option<SheetSchema>,
    pub validation: Option<ValidationResult>,
    pub pending_edits: EditBuffer,
    pub recent_files: Vec<PathBuf>,
    pub watch_enabled: bool,
    pub is_loading: bool,
    pub is_applying: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub has_file_changed: bool,
    pub error: Option<String>,
}

impl PanelView {
    /// Where the next `load_more` will read from.
    pub fn next_fetch_offset(&self) -> u32 {
        self.offset + self.rows.len() as u32
    }

    /// Value the window currently shows at absolute sheet coordinates, or
    /// `Empty` outside the window.
    pub fn loaded_value(&self, row: u32, col: u32) -> CellValue {
        let range_start = self
            .active_range
            .as_deref()
            .and_then(|r| CellRange::parse(r).ok())
            .map(|r| r.start.row)
            .unwrap_or(0);
        let Some(index) = row.checked_sub(range_start + self.offset) else {
            return CellValue::Empty;
        };
        let Some(position) = self.columns.iter().position(|c| c.index == col) else {
            return CellValue::Empty;
        };
        self.rows
            .get(index as usize)
            .and_then(|cells| cells.get(position))
            .cloned()
            .unwrap_or_default()
    }
}

/// Where the edit buffer stands in the apply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Clean,
    Dirty,
    Applying,
}

/// Result of a read-issuing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The window was replaced. `discarded_edits` lists the pending edits the
    /// reload threw away.
    Loaded { discarded_edits: Vec<CellEdit> },
    /// `load_more` appended this many rows.
    Appended { rows: u32 },
    NoFile,
    /// The window already covers every row.
    NothingMore,
    /// Another page read is already in flight.
    Skipped,
    /// A newer read was issued before this one returned; its result was
    /// dropped.
    Superseded,
    Failed(StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied { edits_applied: u32, new_checksum: String },
    /// The store refused the whole batch; the buffer is untouched.
    Rejected { errors: Vec<String>, current_checksum: String },
    Failed(StoreError),
    NoFile,
    NothingToApply,
    /// Another apply is in flight.
    Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Watching,
    Stopped,
    NoFile,
    Failed(StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Buffered { replaced: bool },
    NoFile,
    /// Edits are frozen while an apply is in flight.
    Busy,
}

#[derive(Debug, Default)]
struct PanelState {
    view: PanelView,
    /// Bumped by every full read; results tagged with an older value are stale.
    generation: u64,
    loading_more: bool,
}

pub struct Panel<S: TabularStore> {
    panel_id: Uuid,
    store: Arc<S>,
    settings: PanelSettings,
    state: StdMutex<PanelState>,
}

impl<S: TabularStore> Panel<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_settings(store, PanelSettings::default())
    }

    pub fn with_settings(store: Arc<S>, settings: PanelSettings) -> Self {
        let panel_id = Uuid::new_v4();
        info!(panel = %panel_id, "panel created");
        Self { panel_id, store, settings, state: StdMutex::new(PanelState::default()) }
    }

    pub fn panel_id(&self) -> Uuid {
        self.panel_id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &PanelSettings {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().expect("panel state lock poisoned")
    }

    /// Run a store call under the request timeout.
    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit = self.settings.request_timeout;
        match tokio::time::timeout(limit, request).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    panel = %self.panel_id,
                    timeout_ms = limit.as_millis() as u64,
                    "store call timed out"
                );
                Err(StoreError::Timeout(limit.as_millis() as u64))
            }
        }
    }

    // ── Snapshots ──────────────────────────────────────────────────

    pub fn view(&self) -> PanelView {
        self.state().view.clone()
    }

    pub fn sync_state(&self) -> SyncState {
        let state = self.state();
        if state.view.is_applying {
            SyncState::Applying
        } else if state.view.pending_edits.is_empty() {
            SyncState::Clean
        } else {
            SyncState::Dirty
        }
    }

    pub fn next_fetch_offset(&self) -> u32 {
        self.state().view.next_fetch_offset()
    }

    pub fn has_file_changed(&self) -> bool {
        self.state().view.has_file_changed
    }

    pub fn error(&self) -> Option<String> {
        self.state().view.error.clone()
    }

    pub fn clear_error(&self) {
        self.state().view.error = None;
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Configuration snapshot for persistence.
    pub fn config(&self) -> PanelConfig {
        let state = self.state();
        let view = &state.view;
        PanelConfig {
            file_path: view.file_path.clone(),
            active_sheet: view.active_sheet.clone(),
            active_range: view.active_range.clone(),
            recent_files: view.recent_files.clone(),
            watch_enabled: view.watch_enabled,
            schema: view.schema.clone(),
        }
    }

    /// Re-attach schema and history, re-open the file and re-enable
    /// watching as recorded in `config`.
    pub async fn restore(&self, config: PanelConfig) -> LoadOutcome {
        {
            let mut state = self.state();
            state.view.schema = config.schema;
            state.view.validation = None;
            state.view.recent_files = config.recent_files;
            state.view.recent_files.truncate(self.settings.recent_files_limit);
        }
        let Some(path) = config.file_path else {
            return LoadOutcome::NoFile;
        };

        let outcome = self
            .load(pagination::ReadTarget {
                path,
                sheet: config.active_sheet,
                range: config.active_range,
            })
            .await;
        let already_watching = self.state().view.watch_enabled;
        let loaded = matches!(outcome, LoadOutcome::Loaded { .. });
        if loaded && config.watch_enabled && !already_watching {
            self.toggle_watch().await;
        }
        outcome
    }

    /// Stop watching and drop the open file. Recent files and the schema
    /// survive.
    pub async fn close(&self) {
        let watched = {
            let mut state = self.state();
            state.generation += 1;
            let view = std::mem::take(&mut state.view);
            state.view.recent_files = view.recent_files;
            state.view.schema = view.schema;
            view.file_path.filter(|_| view.watch_enabled)
        };
        info!(panel = %self.panel_id, "panel closed");

        if let Some(path) = watched {
            if let Err(e) = self.call(self.store.watch(path.clone(), false)).await {
                warn!(
                    panel = %self.panel_id,
                    path = %path.display(),
                    error = %e,
                    "unwatch on close failed"
                );
            }
        }
    }
}
