// Remote tabular store boundary.
//
// A store reads, validates, applies edits to and watches spreadsheet-like
// files. Panels only talk to a store through `TabularStore`.

pub mod file;
pub mod memory;

use std::future::Future;
use std::path::{Path, PathBuf};

use gridsync_common::types::{
    ApplyRequest, ApplyResult, FileChangeEvent, ReadRequest, ReadResult, SizeInfo,
    ValidateRequest, ValidationResult,
};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::workbook::{EditRejection, Workbook};

/// Capacity of the change-notification broadcast channel.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Failures of a store call itself (as opposed to rejected edits, which are
/// returned as data in `ApplyResult`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    #[error("invalid workbook format: {0}")]
    InvalidFormat(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("store call timed out after {0} ms")]
    Timeout(u64),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn file_not_found(path: &Path) -> Self {
        Self::FileNotFound(path.to_path_buf())
    }

    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::SheetNotFound(_) => "SHEET_NOT_FOUND",
            Self::InvalidFormat(_) => "INVALID_FORMAT",
            Self::InvalidRange(_) => "INVALID_RANGE",
            Self::Read(_) => "READ_ERROR",
            Self::Write(_) => "WRITE_ERROR",
            Self::Watch(_) => "WATCH_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Operations a panel consumes from the store.
///
/// `watch` is fire-and-forget from the store's side: once enabled, change
/// notifications for the path arrive on every receiver returned by
/// `subscribe`.
pub trait TabularStore: Send + Sync + 'static {
    fn read(
        &self,
        request: ReadRequest,
    ) -> impl Future<Output = Result<ReadResult, StoreError>> + Send;

    fn validate(
        &self,
        request: ValidateRequest,
    ) -> impl Future<Output = Result<ValidationResult, StoreError>> + Send;

    fn apply(
        &self,
        request: ApplyRequest,
    ) -> impl Future<Output = Result<ApplyResult, StoreError>> + Send;

    fn watch(
        &self,
        path: PathBuf,
        enable: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent>;
}

/// Message used when an apply is rejected because the file moved on.
pub(crate) fn checksum_mismatch_message(expected: &str, current: &str) -> String {
    format!("File has been modified. Expected checksum: {expected}, current: {current}")
}

/// Cut the requested page out of `workbook` and package it as a read result.
pub(crate) fn read_result(
    workbook: &Workbook,
    request: &ReadRequest,
    checksum: String,
    file_size_bytes: u64,
) -> Result<ReadResult, StoreError> {
    let window = workbook.read_window(
        request.sheet.as_deref(),
        request.range.as_deref(),
        request.offset,
        request.max_rows,
    )?;
    let sheet = workbook.sheet(Some(window.sheet.as_str()))?;
    Ok(ReadResult {
        sheets: workbook.sheet_infos(),
        size_info: SizeInfo {
            file_size_bytes,
            row_count: sheet.row_count(),
            col_count: sheet.col_count(),
        },
        sheet: window.sheet,
        columns: window.columns,
        rows: window.rows,
        checksum,
        total_rows: window.total_rows,
        offset: window.offset,
        has_more: window.has_more,
    })
}

/// Check the precondition and apply the batch in place.
///
/// Returns the number of edits applied, or the messages explaining why the
/// whole batch was refused. `workbook` is untouched on refusal.
pub(crate) fn apply_checked(
    workbook: &mut Workbook,
    request: &ApplyRequest,
    current_checksum: &str,
) -> Result<u32, Vec<String>> {
    if let Some(expected) = request.expected_checksum.as_deref() {
        if expected != current_checksum {
            return Err(vec![checksum_mismatch_message(expected, current_checksum)]);
        }
    }
    workbook.apply_edits(&request.sheet, &request.edits).map_err(|rejection| match rejection {
        EditRejection::UnknownSheet(name) => vec![format!("Sheet not found: {name}")],
        EditRejection::InvalidEdits(problems) => problems,
    })
}

/// Result for a batch that was refused as a whole.
pub(crate) fn rejected(current_checksum: &str, errors: Vec<String>) -> ApplyResult {
    ApplyResult {
        success: false,
        edits_applied: 0,
        new_checksum: current_checksum.to_string(),
        errors,
    }
}
