// Operation shapes exchanged between a panel and a tabular store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cell::CellValue;
use crate::schema::SheetSchema;

/// Default number of rows fetched by a single read.
pub const DEFAULT_CHUNK_ROWS: u32 = 1000;

/// A sheet within a workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub name: String,
    pub index: u32,
    pub row_count: u32,
    pub col_count: u32,
}

/// Column metadata for the loaded window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Absolute 0-based column index in the sheet.
    pub index: u32,
    /// Column letters (`A`, `B`, ... `AA`).
    pub name: String,
    /// First-row value when the window starts at the top of the sheet.
    pub header: Option<String>,
    pub width: Option<f64>,
    /// Inferred type: the most frequent non-empty value type in the window.
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SizeInfo {
    pub file_size_bytes: u64,
    pub row_count: u32,
    pub col_count: u32,
}

/// A pending mutation of one cell.
///
/// `original_value` is a snapshot of what the loaded window showed when the
/// edit was created; it is not tracked forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEdit {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    #[serde(default)]
    pub original_value: Option<CellValue>,
}

// ── Read ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub path: PathBuf,
    pub sheet: Option<String>,
    pub range: Option<String>,
    pub offset: u32,
    pub max_rows: u32,
}

impl ReadRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet: None,
            range: None,
            offset: 0,
            max_rows: DEFAULT_CHUNK_ROWS,
        }
    }

    pub fn sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    pub fn range(mut self, range: Option<String>) -> Self {
        self.range = range;
        self
    }

    pub fn page(mut self, offset: u32, max_rows: u32) -> Self {
        self.offset = offset;
        self.max_rows = max_rows;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResult {
    pub sheets: Vec<SheetInfo>,
    /// The sheet that was actually read (the first sheet when none was named).
    pub sheet: String,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
    pub checksum: String,
    pub size_info: SizeInfo,
    pub total_rows: u32,
    pub offset: u32,
    pub has_more: bool,
}

// ── Validate ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub path: PathBuf,
    pub sheet: Option<String>,
    pub range: Option<String>,
    pub schema: SheetSchema,
    /// Restrict validation to a page of rows; `None` validates the whole sheet.
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub max_rows: Option<u32>,
}

/// Machine-readable validation failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorKind {
    MissingRequired,
    TypeMismatch,
    OutOfRange,
    PatternMismatch,
    InvalidValue,
    MissingColumn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub row: u32,
    pub col: u32,
    pub column_name: String,
    pub message: String,
    pub kind: ValidationErrorKind,
    pub current_value: CellValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub row: u32,
    pub col: u32,
    pub column_name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub rows_checked: u32,
}

// ── Apply ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub path: PathBuf,
    pub sheet: String,
    pub edits: Vec<CellEdit>,
    /// Optimistic-concurrency precondition: the checksum the edits were made
    /// against. `None` skips the check.
    pub expected_checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub success: bool,
    pub edits_applied: u32,
    pub new_checksum: String,
    pub errors: Vec<String>,
}

// ── Watch ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileChangeType {
    Modified,
    Deleted,
    Renamed,
}

/// Out-of-band change notification for a watched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub change_type: FileChangeType,
    pub new_checksum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_defaults_to_first_chunk() {
        let request = ReadRequest::new("/data/book.json");
        assert_eq!(request.offset, 0);
        assert_eq!(request.max_rows, DEFAULT_CHUNK_ROWS);
        assert!(request.sheet.is_none());
    }

    #[test]
    fn cell_edit_without_original_deserializes() {
        let edit: CellEdit = serde_json::from_value(serde_json::json!({
            "row": 2,
            "col": 1,
            "value": { "type": "String", "value": "x" }
        }))
        .unwrap();
        assert_eq!(edit.row, 2);
        assert!(edit.original_value.is_none());
    }

    #[test]
    fn change_event_roundtrips() {
        let event = FileChangeEvent {
            path: PathBuf::from("/data/book.json"),
            change_type: FileChangeType::Deleted,
            new_checksum: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: FileChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
