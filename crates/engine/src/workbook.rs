// In-memory workbook model shared by the stores.
//
// Handles paginated window reads (header capture, type inference, range
// restriction) and all-or-nothing batch edits. Coordinates are 0-based.

use gridsync_common::address::{column_letter, CellRange, MAX_COLS, MAX_ROWS};
use gridsync_common::cell::CellValue;
use gridsync_common::types::{CellEdit, ColumnInfo, SheetInfo};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::watcher::hash::sha256_hex;

/// Value types in the order used to break inference ties.
const INFERRED_TYPES: [&str; 6] = ["string", "number", "boolean", "datetime", "formula", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Workbook {
    /// Bumped on every applied batch so the content fingerprint always moves.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Vec<CellValue>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_widths: Vec<Option<f64>>,
}

/// A page of rows cut from one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub sheet: String,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
    pub total_rows: u32,
    pub col_count: u32,
    pub offset: u32,
    /// Absolute sheet row of `rows[0]`.
    pub first_row: u32,
    pub has_more: bool,
}

/// Why a batch of edits was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum EditRejection {
    UnknownSheet(String),
    InvalidEdits(Vec<String>),
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { name: name.into(), rows, column_widths: Vec::new() }
    }

    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    pub fn col_count(&self) -> u32 {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0) as u32
    }

    pub fn cell(&self, row: u32, col: u32) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows.get(row as usize).and_then(|r| r.get(col as usize)).unwrap_or(&EMPTY)
    }

    fn set_cell(&mut self, row: u32, col: u32, value: CellValue) {
        let (row, col) = (row as usize, col as usize);
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Empty);
        }
        cells[col] = value;
    }
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { revision: 0, sheets }
    }

    /// One-sheet workbook holding a loaded window. Rows land at the top of
    /// the sheet and column widths carry over by position.
    pub fn from_window(sheet: &str, columns: &[ColumnInfo], rows: &[Vec<CellValue>]) -> Self {
        let mut exported = Sheet::new(sheet, rows.to_vec());
        exported.column_widths = columns.iter().map(|c| c.width).collect();
        if exported.column_widths.iter().all(Option::is_none) {
            exported.column_widths.clear();
        }
        Self::new(vec![exported])
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::InvalidFormat(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(self).map_err(|e| StoreError::Internal(e.to_string()))
    }

    /// SHA-256 of the serialized workbook.
    pub fn fingerprint(&self) -> Result<String, StoreError> {
        Ok(sha256_hex(&self.to_json()?))
    }

    pub fn sheet_infos(&self) -> Vec<SheetInfo> {
        self.sheets
            .iter()
            .enumerate()
            .map(|(index, sheet)| SheetInfo {
                name: sheet.name.clone(),
                index: index as u32,
                row_count: sheet.row_count(),
                col_count: sheet.col_count(),
            })
            .collect()
    }

    /// Find a sheet by name, or the first sheet when `name` is `None`.
    pub fn sheet(&self, name: Option<&str>) -> Result<&Sheet, StoreError> {
        match name {
            Some(name) => self
                .sheets
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| StoreError::SheetNotFound(name.to_string())),
            None => self
                .sheets
                .first()
                .ok_or_else(|| StoreError::InvalidFormat("workbook has no sheets".to_string())),
        }
    }

    /// Cut a page of at most `max_rows` rows starting at `offset`.
    ///
    /// With a `range`, `offset` and `total_rows` are relative to the range's
    /// first row and only the range's columns are returned.
    pub fn read_window(
        &self,
        sheet: Option<&str>,
        range: Option<&str>,
        offset: u32,
        max_rows: u32,
    ) -> Result<Window, StoreError> {
        let sheet = self.sheet(sheet)?;
        let (row_start, row_end, col_start, col_end) = bounds(sheet, range)?;

        let total_rows = row_end.saturating_sub(row_start);
        let first = row_start.saturating_add(offset).min(row_end);
        let last = first.saturating_add(max_rows).min(row_end);

        let rows: Vec<Vec<CellValue>> = (first..last)
            .map(|r| (col_start..col_end).map(|c| sheet.cell(r, c).clone()).collect())
            .collect();

        let columns = build_columns(sheet, &rows, col_start, col_end, offset == 0);
        let has_more = offset.saturating_add(rows.len() as u32) < total_rows;

        Ok(Window {
            sheet: sheet.name.clone(),
            columns,
            rows,
            total_rows,
            col_count: col_end.saturating_sub(col_start),
            offset,
            first_row: first,
            has_more,
        })
    }

    /// Apply every edit or none of them. Returns the number applied.
    pub fn apply_edits(&mut self, sheet: &str, edits: &[CellEdit]) -> Result<u32, EditRejection> {
        let index = self
            .sheets
            .iter()
            .position(|s| s.name == sheet)
            .ok_or_else(|| EditRejection::UnknownSheet(sheet.to_string()))?;

        let problems: Vec<String> = edits.iter().filter_map(check_edit).collect();
        if !problems.is_empty() {
            return Err(EditRejection::InvalidEdits(problems));
        }

        let target = &mut self.sheets[index];
        for edit in edits {
            target.set_cell(edit.row, edit.col, edit.value.clone());
        }
        self.revision += 1;
        Ok(edits.len() as u32)
    }
}

fn check_edit(edit: &CellEdit) -> Option<String> {
    if edit.row >= MAX_ROWS || edit.col >= MAX_COLS {
        return Some(format!(
            "Row {}, Col {}: cell is outside the sheet grid",
            edit.row, edit.col
        ));
    }
    if !edit.value.is_finite() {
        return Some(format!("Row {}, Col {}: number must be finite", edit.row, edit.col));
    }
    if let CellValue::Formula { formula, .. } = &edit.value {
        if formula.trim().trim_start_matches('=').is_empty() {
            return Some(format!("Row {}, Col {}: formula is empty", edit.row, edit.col));
        }
    }
    None
}

/// Half-open row and column bounds of the readable region.
fn bounds(sheet: &Sheet, range: Option<&str>) -> Result<(u32, u32, u32, u32), StoreError> {
    let rows = sheet.row_count();
    let cols = sheet.col_count();
    match range {
        None => Ok((0, rows, 0, cols)),
        Some(text) => {
            let range =
                CellRange::parse(text).map_err(|e| StoreError::InvalidRange(e.to_string()))?;
            let row_start = range.start.row.min(rows);
            let row_end = (range.end.row + 1).min(rows).max(row_start);
            let col_start = range.start.col.min(cols);
            let col_end = (range.end.col + 1).min(cols).max(col_start);
            Ok((row_start, row_end, col_start, col_end))
        }
    }
}

fn build_columns(
    sheet: &Sheet,
    rows: &[Vec<CellValue>],
    col_start: u32,
    col_end: u32,
    capture_header: bool,
) -> Vec<ColumnInfo> {
    (col_start..col_end)
        .enumerate()
        .map(|(position, index)| {
            let header = if capture_header {
                rows.first().and_then(|r| r.get(position)).and_then(header_text)
            } else {
                None
            };
            ColumnInfo {
                index,
                name: column_letter(index),
                header,
                width: sheet.column_widths.get(index as usize).copied().flatten(),
                data_type: Some(infer_type(rows, position).to_string()),
            }
        })
        .collect()
}

fn header_text(value: &CellValue) -> Option<String> {
    match value {
        CellValue::String(s) if !s.is_empty() => Some(s.clone()),
        CellValue::Number(_) => Some(value.display()),
        _ => None,
    }
}

fn infer_type(rows: &[Vec<CellValue>], position: usize) -> &'static str {
    let mut counts = [0usize; INFERRED_TYPES.len()];
    for value in rows.iter().filter_map(|r| r.get(position)) {
        if let Some(slot) = INFERRED_TYPES.iter().position(|t| *t == value.type_name()) {
            counts[slot] += 1;
        }
    }
    let mut best = 0;
    for (slot, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = slot;
        }
    }
    INFERRED_TYPES[best]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> CellValue {
        CellValue::String(text.to_string())
    }

    fn n(value: f64) -> CellValue {
        CellValue::Number(value)
    }

    fn people() -> Workbook {
        Workbook::new(vec![
            Sheet::new(
                "People",
                vec![
                    vec![s("Name"), s("Age"), s("City")],
                    vec![s("Ada"), n(36.0), s("London")],
                    vec![s("Grace"), n(85.0), CellValue::Empty],
                    vec![s("Linus"), n(54.0), s("Helsinki")],
                ],
            ),
            Sheet::new("Empty", Vec::new()),
        ])
    }

    fn edit(row: u32, col: u32, value: CellValue) -> CellEdit {
        CellEdit { row, col, value, original_value: None }
    }

    // ── read_window ────────────────────────────────────────────────

    #[test]
    fn first_page_captures_headers_and_types() {
        let window = people().read_window(None, None, 0, 1000).unwrap();
        assert_eq!(window.sheet, "People");
        assert_eq!(window.rows.len(), 4);
        assert_eq!(window.total_rows, 4);
        assert!(!window.has_more);
        assert_eq!(window.columns[1].name, "B");
        assert_eq!(window.columns[1].header.as_deref(), Some("Age"));
        assert_eq!(window.columns[1].data_type.as_deref(), Some("number"));
        assert_eq!(window.columns[0].data_type.as_deref(), Some("string"));
    }

    #[test]
    fn later_pages_have_no_headers() {
        let window = people().read_window(None, None, 2, 1).unwrap();
        assert_eq!(window.rows, vec![vec![s("Grace"), n(85.0), CellValue::Empty]]);
        assert_eq!(window.offset, 2);
        assert!(window.has_more);
        assert!(window.columns.iter().all(|c| c.header.is_none()));
    }

    #[test]
    fn offset_past_end_returns_no_rows() {
        let window = people().read_window(None, None, 10, 5).unwrap();
        assert!(window.rows.is_empty());
        assert!(!window.has_more);
    }

    #[test]
    fn range_restricts_rows_and_columns() {
        let window = people().read_window(Some("People"), Some("B2:C4"), 0, 2).unwrap();
        assert_eq!(window.total_rows, 3);
        assert_eq!(window.rows, vec![vec![n(36.0), s("London")], vec![n(85.0), CellValue::Empty]]);
        assert_eq!(window.columns[0].index, 1);
        assert_eq!(window.columns[0].name, "B");
        assert_eq!(window.first_row, 1);
        assert!(window.has_more);
    }

    #[test]
    fn unknown_sheet_and_bad_range_are_errors() {
        let book = people();
        assert_eq!(
            book.read_window(Some("Nope"), None, 0, 10),
            Err(StoreError::SheetNotFound("Nope".into()))
        );
        assert!(matches!(
            book.read_window(None, Some("1A:??"), 0, 10),
            Err(StoreError::InvalidRange(_))
        ));
    }

    #[test]
    fn empty_sheet_reads_as_empty_window() {
        let window = people().read_window(Some("Empty"), None, 0, 10).unwrap();
        assert!(window.rows.is_empty());
        assert!(window.columns.is_empty());
        assert_eq!(window.total_rows, 0);
    }

    // ── apply_edits ────────────────────────────────────────────────

    #[test]
    fn apply_grows_sheet_and_bumps_revision() {
        let mut book = people();
        let before = book.fingerprint().unwrap();
        let applied = book.apply_edits("People", &[edit(5, 4, s("new"))]).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(book.revision, 1);
        assert_eq!(book.sheets[0].cell(5, 4), &s("new"));
        assert_eq!(book.sheets[0].cell(4, 0), &CellValue::Empty);
        assert_ne!(book.fingerprint().unwrap(), before);
    }

    #[test]
    fn identical_values_still_change_fingerprint() {
        let mut book = people();
        let before = book.fingerprint().unwrap();
        book.apply_edits("People", &[edit(1, 0, s("Ada"))]).unwrap();
        assert_ne!(book.fingerprint().unwrap(), before);
    }

    #[test]
    fn invalid_edit_rejects_whole_batch() {
        let mut book = people();
        let original = book.clone();
        let result = book.apply_edits(
            "People",
            &[edit(1, 0, s("changed")), edit(MAX_ROWS, 0, s("too far"))],
        );
        assert!(matches!(result, Err(EditRejection::InvalidEdits(ref p)) if p.len() == 1));
        assert_eq!(book, original);
    }

    #[test]
    fn non_finite_number_rejects_whole_batch() {
        let mut book = people();
        let original = book.clone();
        let result = book.apply_edits("People", &[edit(1, 1, n(40.0)), edit(2, 1, n(f64::NAN))]);
        assert_eq!(
            result,
            Err(EditRejection::InvalidEdits(vec!["Row 2, Col 1: number must be finite".into()]))
        );
        assert_eq!(book, original);
    }

    #[test]
    fn unknown_sheet_rejects_batch() {
        let mut book = people();
        assert_eq!(
            book.apply_edits("Missing", &[edit(0, 0, n(1.0))]),
            Err(EditRejection::UnknownSheet("Missing".into()))
        );
    }

    #[test]
    fn window_becomes_single_sheet_workbook() {
        let window = people().read_window(Some("People"), Some("B1:C3"), 0, 10).unwrap();
        let book = Workbook::from_window("Copy", &window.columns, &window.rows);
        assert_eq!(book.sheets.len(), 1);
        assert_eq!(book.sheets[0].name, "Copy");
        assert_eq!(book.sheets[0].cell(0, 0), &s("Age"));
        assert_eq!(book.sheets[0].cell(2, 0), &n(85.0));
        assert_eq!(book.sheets[0].row_count(), 3);
        assert!(book.sheets[0].column_widths.is_empty());
    }

    #[test]
    fn json_roundtrip_preserves_workbook() {
        let book = people();
        let parsed = Workbook::from_json(&book.to_json().unwrap()).unwrap();
        assert_eq!(parsed, book);
        assert!(matches!(Workbook::from_json(b"not json"), Err(StoreError::InvalidFormat(_))));
    }
}
