// Tabular store backed by JSON workbook files on disk.
//
// The checksum of a file is the SHA-256 of its bytes. Applies rewrite the
// whole file through a temporary sibling and a rename, so readers never see
// a half-written workbook. Watching runs one notify watcher and one change
// pump per file.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use gridsync_common::cell::CellValue;
use gridsync_common::types::{
    ApplyRequest, ApplyResult, ColumnInfo, FileChangeEvent, ReadRequest, ReadResult,
    ValidateRequest, ValidationResult,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    apply_checked, read_result, rejected, StoreError, TabularStore, CHANGE_CHANNEL_CAPACITY,
};
use crate::validate::validate_workbook;
use crate::watcher::hash::{checksum_file, sha256_hex};
use crate::watcher::pump::{run_change_pump, ChecksumRegistry, PumpConfig};
use crate::watcher::FileWatcher;
use crate::workbook::Workbook;

#[derive(Debug, Clone, Default)]
pub struct FileStoreOptions {
    /// Copy the file to `<path>.backup.<YYYYMMDD_HHMMSS>` before each apply.
    pub backup_before_apply: bool,
    pub pump: PumpConfig,
}

struct WatchHandle {
    _watcher: FileWatcher,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if !self.task.is_finished() {
            debug!("change pump still running at unwatch, signalled shutdown");
        }
    }
}

pub struct JsonFileStore {
    options: FileStoreOptions,
    registry: Arc<ChecksumRegistry>,
    changes: broadcast::Sender<FileChangeEvent>,
    watches: StdMutex<HashMap<PathBuf, WatchHandle>>,
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new(FileStoreOptions::default())
    }
}

impl JsonFileStore {
    pub fn new(options: FileStoreOptions) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            options,
            registry: Arc::new(ChecksumRegistry::new()),
            changes,
            watches: StdMutex::new(HashMap::new()),
        }
    }

    /// Write `workbook` to `path` atomically. Returns the new checksum.
    pub fn write_workbook(path: &Path, workbook: &Workbook) -> Result<String, StoreError> {
        let bytes = workbook.to_json()?;
        write_atomic(path, &bytes)?;
        Ok(sha256_hex(&bytes))
    }

    /// Load and parse the workbook at `path` together with its checksum.
    pub fn load_workbook(path: &Path) -> Result<(Workbook, String, u64), StoreError> {
        let bytes = read_bytes(path)?;
        let checksum = sha256_hex(&bytes);
        let workbook = Workbook::from_json(&bytes)?;
        Ok((workbook, checksum, bytes.len() as u64))
    }

    /// Copy `path` to `<path>.backup.<YYYYMMDD_HHMMSS>` (UTC). Returns the
    /// backup path.
    pub fn backup(path: &Path) -> Result<PathBuf, StoreError> {
        if !path.is_file() {
            return Err(StoreError::file_not_found(path));
        }
        let backup_path = backup_path(path);
        std::fs::copy(path, &backup_path).map_err(|e| {
            StoreError::Write(format!("failed to back up to {}: {e}", backup_path.display()))
        })?;
        debug!(backup = %backup_path.display(), "backup written");
        Ok(backup_path)
    }

    /// Write a loaded window to `output` as a one-sheet workbook. Returns the
    /// checksum of the new file.
    pub fn export_window(
        output: &Path,
        sheet: &str,
        columns: &[ColumnInfo],
        rows: &[Vec<CellValue>],
    ) -> Result<String, StoreError> {
        let workbook = Workbook::from_window(sheet, columns, rows);
        let checksum = Self::write_workbook(output, &workbook)?;
        info!(output = %output.display(), rows = rows.len(), "window exported");
        Ok(checksum)
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watches.lock().expect("watch map lock poisoned").contains_key(path)
    }

    fn apply_blocking(
        request: &ApplyRequest,
        backup: bool,
        registry: &ChecksumRegistry,
    ) -> Result<ApplyResult, StoreError> {
        let path = request.path.as_path();
        let (mut workbook, current, _) = Self::load_workbook(path)?;

        let edits_applied = match apply_checked(&mut workbook, request, &current) {
            Ok(applied) => applied,
            Err(errors) => {
                debug!(path = %path.display(), errors = errors.len(), "apply refused");
                return Ok(rejected(&current, errors));
            }
        };

        if backup {
            Self::backup(path)?;
        }

        let bytes = workbook.to_json()?;
        let new_checksum = sha256_hex(&bytes);
        // Known before the rename lands, so our own write is never reported.
        registry.record(path, &new_checksum);
        if let Err(e) = write_atomic(path, &bytes) {
            registry.record(path, &current);
            return Err(e);
        }

        info!(path = %path.display(), edits_applied, "edits applied");
        Ok(ApplyResult { success: true, edits_applied, new_checksum, errors: Vec::new() })
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, StoreError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StoreError::file_not_found(path),
        _ => StoreError::Read(format!("failed to read {}: {e}", path.display())),
    })
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn backup_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    sibling_with_suffix(path, &format!(".backup.{stamp}"))
}

fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".gridsync.tmp");
    parent.join(name)
}

/// Write through a temporary sibling, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = temp_path(path);
    std::fs::write(&tmp, bytes)
        .map_err(|e| StoreError::Write(format!("failed to write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        StoreError::Write(format!("failed to replace {}: {e}", path.display()))
    })
}

async fn blocking<T, F>(work: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
}

impl TabularStore for JsonFileStore {
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, StoreError> {
        let registry = self.registry.clone();
        blocking(move || {
            let (workbook, checksum, size) = Self::load_workbook(&request.path)?;
            registry.record(&request.path, &checksum);
            read_result(&workbook, &request, checksum, size)
        })
        .await
    }

    async fn validate(&self, request: ValidateRequest) -> Result<ValidationResult, StoreError> {
        blocking(move || {
            let (workbook, _, _) = Self::load_workbook(&request.path)?;
            validate_workbook(&workbook, &request)
        })
        .await
    }

    async fn apply(&self, request: ApplyRequest) -> Result<ApplyResult, StoreError> {
        let backup = self.options.backup_before_apply;
        let registry = self.registry.clone();
        blocking(move || Self::apply_blocking(&request, backup, &registry)).await
    }

    async fn watch(&self, path: PathBuf, enable: bool) -> Result<(), StoreError> {
        if !enable {
            let removed = self.watches.lock().expect("watch map lock poisoned").remove(&path);
            if removed.is_some() {
                info!(path = %path.display(), "stopped watching");
            }
            return Ok(());
        }
        if self.is_watched(&path) {
            return Ok(());
        }

        let checksum = checksum_file(&path)?;
        let (watcher, raw_rx) = FileWatcher::start(&path)?;
        self.registry.record(&path, &checksum);

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_change_pump(
            path.clone(),
            raw_rx,
            self.changes.clone(),
            self.registry.clone(),
            self.options.pump.clone(),
            shutdown_rx,
        ));

        let mut watches = self.watches.lock().expect("watch map lock poisoned");
        if watches.contains_key(&path) {
            // Lost a race with a concurrent watch of the same path.
            warn!(path = %path.display(), "duplicate watch dropped");
            return Ok(());
        }
        watches.insert(path.clone(), WatchHandle { _watcher: watcher, shutdown, task });
        info!(path = %path.display(), "watching");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.changes.subscribe()
    }
}
