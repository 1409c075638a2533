// gridsync-engine: paginated tabular views with buffered edits reconciled
// against the file under a checksum precondition.

pub mod config;
pub mod panel;
pub mod store;
pub mod validate;
pub mod watcher;
pub mod workbook;

pub use panel::{
    ApplyOutcome, EditOutcome, LoadOutcome, Panel, PanelSettings, PanelView, SyncState,
    WatchOutcome,
};
pub use store::{StoreError, TabularStore};
