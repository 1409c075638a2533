// Edit buffer: at most one pending edit per (row, col).

use std::collections::BTreeMap;

use gridsync_common::cell::{CellValue, EditInput};
use gridsync_common::types::CellEdit;
use tracing::debug;

use super::{EditOutcome, Panel};
use crate::store::TabularStore;

/// Pending cell edits keyed by coordinate, iterated in (row, col) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditBuffer {
    edits: BTreeMap<(u32, u32), CellEdit>,
}

impl EditBuffer {
    /// Insert or replace the edit at the edit's coordinate. Returns the
    /// edit it replaced.
    pub fn insert(&mut self, edit: CellEdit) -> Option<CellEdit> {
        self.edits.insert((edit.row, edit.col), edit)
    }

    pub fn remove(&mut self, row: u32, col: u32) -> Option<CellEdit> {
        self.edits.remove(&(row, col))
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&CellEdit> {
        self.edits.get(&(row, col))
    }

    pub fn clear(&mut self) {
        self.edits.clear();
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellEdit> {
        self.edits.values()
    }

    pub fn to_vec(&self) -> Vec<CellEdit> {
        self.edits.values().cloned().collect()
    }

    /// Empty the buffer, returning what it held.
    pub fn take(&mut self) -> Vec<CellEdit> {
        std::mem::take(&mut self.edits).into_values().collect()
    }
}

impl<S: TabularStore> Panel<S> {
    /// Buffer a new value for a cell (absolute sheet coordinates).
    ///
    /// `original_value` is whatever the loaded window shows at that cell
    /// right now, or `Empty` when the cell is outside the window. A second
    /// edit of the same cell replaces the first and re-captures it.
    pub fn add_pending_edit(&self, row: u32, col: u32, input: impl Into<EditInput>) -> EditOutcome {
        let mut state = self.state();
        let view = &mut state.view;
        if view.file_path.is_none() {
            return EditOutcome::NoFile;
        }
        if view.is_applying {
            return EditOutcome::Busy;
        }

        let edit = CellEdit {
            row,
            col,
            value: CellValue::from_input(input.into()),
            original_value: Some(view.loaded_value(row, col)),
        };
        let replaced = view.pending_edits.insert(edit).is_some();
        debug!(panel = %self.panel_id, row, col, replaced, "pending edit buffered");
        EditOutcome::Buffered { replaced }
    }

    /// Drop the pending edit at (row, col), if any. Returns whether one was
    /// removed.
    pub fn remove_pending_edit(&self, row: u32, col: u32) -> bool {
        let mut state = self.state();
        if state.view.is_applying {
            return false;
        }
        state.view.pending_edits.remove(row, col).is_some()
    }

    /// Drop every pending edit. Refused while an apply is in flight.
    pub fn clear_pending_edits(&self) -> bool {
        let mut state = self.state();
        if state.view.is_applying {
            return false;
        }
        state.view.pending_edits.clear();
        true
    }

    /// Pending edits ordered by (row, col).
    pub fn pending_edits(&self) -> Vec<CellEdit> {
        self.state().view.pending_edits.to_vec()
    }
}
