// In-process tabular store.
//
// Workbooks live in a map keyed by path. Every call is recorded so tests
// can assert on what a panel asked for, and failures or latency can be
// injected per operation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use gridsync_common::types::{
    ApplyRequest, ApplyResult, FileChangeEvent, FileChangeType, ReadRequest, ReadResult,
    ValidateRequest, ValidationResult,
};
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    apply_checked, read_result, rejected, StoreError, TabularStore, CHANGE_CHANNEL_CAPACITY,
};
use crate::validate::validate_workbook;
use crate::workbook::Workbook;

/// Store operation, for fault and latency injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Read,
    Validate,
    Apply,
    Watch,
}

/// A recorded store call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Read(ReadRequest),
    Validate(ValidateRequest),
    Apply(ApplyRequest),
    Watch { path: PathBuf, enable: bool },
}

#[derive(Default)]
struct MemoryInner {
    workbooks: HashMap<PathBuf, Workbook>,
    watched: HashSet<PathBuf>,
    calls: Vec<StoreCall>,
    failures: HashMap<StoreOp, VecDeque<StoreError>>,
    delays: HashMap<StoreOp, VecDeque<Duration>>,
}

impl MemoryInner {
    /// Record the call and pop any injected failure and delay for it.
    fn begin(&mut self, op: StoreOp, call: StoreCall) -> (Option<StoreError>, Option<Duration>) {
        self.calls.push(call);
        let failure = self.failures.get_mut(&op).and_then(VecDeque::pop_front);
        let delay = self.delays.get_mut(&op).and_then(VecDeque::pop_front);
        (failure, delay)
    }

    fn workbook(&self, path: &Path) -> Result<&Workbook, StoreError> {
        self.workbooks.get(path).ok_or_else(|| StoreError::file_not_found(path))
    }
}

pub struct MemoryStore {
    inner: StdMutex<MemoryInner>,
    changes: broadcast::Sender<FileChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { inner: StdMutex::new(MemoryInner::default()), changes }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Add or replace a workbook without emitting a change notification.
    pub fn insert(&self, path: impl Into<PathBuf>, workbook: Workbook) {
        self.lock().workbooks.insert(path.into(), workbook);
    }

    pub fn workbook(&self, path: &Path) -> Option<Workbook> {
        self.lock().workbooks.get(path).cloned()
    }

    pub fn checksum(&self, path: &Path) -> Result<String, StoreError> {
        self.lock().workbook(path)?.fingerprint()
    }

    /// Mutate a workbook as an outside writer would. Watchers of `path` are
    /// notified with the new checksum.
    pub fn modify<F>(&self, path: &Path, change: F) -> Result<String, StoreError>
    where
        F: FnOnce(&mut Workbook),
    {
        let (checksum, watched) = {
            let mut inner = self.lock();
            let watched = inner.watched.contains(path);
            let workbook =
                inner.workbooks.get_mut(path).ok_or_else(|| StoreError::file_not_found(path))?;
            change(workbook);
            workbook.revision += 1;
            (workbook.fingerprint()?, watched)
        };
        if watched {
            self.notify(path, FileChangeType::Modified, Some(checksum.clone()));
        }
        Ok(checksum)
    }

    /// Delete a workbook as an outside actor would.
    pub fn remove(&self, path: &Path) -> Option<Workbook> {
        let (removed, watched) = {
            let mut inner = self.lock();
            let watched = inner.watched.remove(path);
            (inner.workbooks.remove(path), watched)
        };
        if watched && removed.is_some() {
            self.notify(path, FileChangeType::Deleted, None);
        }
        removed
    }

    /// Broadcast a change notification for `path`, watched or not.
    pub fn notify(&self, path: &Path, change_type: FileChangeType, new_checksum: Option<String>) {
        let event = FileChangeEvent { path: path.to_path_buf(), change_type, new_checksum };
        debug!(path = %path.display(), change = ?change_type, "memory store change");
        // No subscribers is fine.
        let _ = self.changes.send(event);
    }

    /// Make the next call of `op` fail with `error`. Failures queue up.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Make the next call of `op` take `delay` before answering. Delays queue
    /// up.
    pub fn delay_next(&self, op: StoreOp, delay: Duration) {
        self.lock().delays.entry(op).or_default().push_back(delay);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn reads(&self) -> Vec<ReadRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Read(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn applies(&self) -> Vec<ApplyRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Apply(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, op: StoreOp) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    (op, call),
                    (StoreOp::Read, StoreCall::Read(_))
                        | (StoreOp::Validate, StoreCall::Validate(_))
                        | (StoreOp::Apply, StoreCall::Apply(_))
                        | (StoreOp::Watch, StoreCall::Watch { .. })
                )
            })
            .count()
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.lock().watched.contains(path)
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

impl TabularStore for MemoryStore {
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, StoreError> {
        // The answer is computed up front, so a delayed read returns the data
        // as it was when the call arrived.
        let (result, delay) = {
            let mut inner = self.lock();
            let (failure, delay) = inner.begin(StoreOp::Read, StoreCall::Read(request.clone()));
            let result = match failure {
                Some(error) => Err(error),
                None => inner.workbook(&request.path).and_then(|workbook| {
                    let checksum = workbook.fingerprint()?;
                    let size = workbook.to_json()?.len() as u64;
                    read_result(workbook, &request, checksum, size)
                }),
            };
            (result, delay)
        };
        pause(delay).await;
        result
    }

    async fn validate(&self, request: ValidateRequest) -> Result<ValidationResult, StoreError> {
        let (result, delay) = {
            let mut inner = self.lock();
            let (failure, delay) =
                inner.begin(StoreOp::Validate, StoreCall::Validate(request.clone()));
            let result = match failure {
                Some(error) => Err(error),
                None => inner
                    .workbook(&request.path)
                    .and_then(|workbook| validate_workbook(workbook, &request)),
            };
            (result, delay)
        };
        pause(delay).await;
        result
    }

    async fn apply(&self, request: ApplyRequest) -> Result<ApplyResult, StoreError> {
        let (failure, delay) =
            self.lock().begin(StoreOp::Apply, StoreCall::Apply(request.clone()));
        // Latency lands before the write, like a slow round trip.
        pause(delay).await;
        if let Some(error) = failure {
            return Err(error);
        }

        let mut inner = self.lock();
        let workbook = inner
            .workbooks
            .get_mut(&request.path)
            .ok_or_else(|| StoreError::file_not_found(&request.path))?;
        let current = workbook.fingerprint()?;
        match apply_checked(workbook, &request, &current) {
            Ok(edits_applied) => {
                let new_checksum = workbook.fingerprint()?;
                debug!(path = %request.path.display(), edits_applied, "memory store applied edits");
                Ok(ApplyResult { success: true, edits_applied, new_checksum, errors: Vec::new() })
            }
            Err(errors) => Ok(rejected(&current, errors)),
        }
    }

    async fn watch(&self, path: PathBuf, enable: bool) -> Result<(), StoreError> {
        let delay = {
            let mut inner = self.lock();
            let (failure, delay) =
                inner.begin(StoreOp::Watch, StoreCall::Watch { path: path.clone(), enable });
            if let Some(error) = failure {
                return Err(error);
            }
            if enable {
                inner.workbook(&path)?;
                inner.watched.insert(path);
            } else {
                inner.watched.remove(&path);
            }
            delay
        };
        pause(delay).await;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use gridsync_common::cell::CellValue;
    use gridsync_common::types::CellEdit;

    use super::*;
    use crate::workbook::Sheet;

    const PATH: &str = "/data/book.json";

    fn store_with_rows(rows: u32) -> MemoryStore {
        let store = MemoryStore::new();
        let data = (0..rows).map(|r| vec![CellValue::Number(f64::from(r))]).collect();
        store.insert(PATH, Workbook::new(vec![Sheet::new("Data", data)]));
        store
    }

    fn edit(row: u32, value: f64) -> CellEdit {
        CellEdit { row, col: 0, value: CellValue::Number(value), original_value: None }
    }

    fn apply_request(expected: Option<String>) -> ApplyRequest {
        ApplyRequest {
            path: PathBuf::from(PATH),
            sheet: "Data".into(),
            edits: vec![edit(0, 42.0)],
            expected_checksum: expected,
        }
    }

    // ── read ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn read_pages_and_records_call() {
        let store = store_with_rows(25);
        let result = store.read(ReadRequest::new(PATH).page(20, 10)).await.unwrap();
        assert_eq!(result.rows.len(), 5);
        assert_eq!(result.total_rows, 25);
        assert!(!result.has_more);
        assert_eq!(result.sheet, "Data");
        assert_eq!(result.checksum, store.checksum(Path::new(PATH)).unwrap());
        assert_eq!(result.size_info.row_count, 25);

        let reads = store.reads();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].offset, 20);
    }

    #[tokio::test]
    async fn read_missing_file_fails() {
        let store = MemoryStore::new();
        let err = store.read(ReadRequest::new("/nope.json")).await.unwrap_err();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = store_with_rows(1);
        store.fail_next(StoreOp::Read, StoreError::Read("disk on fire".into()));
        assert!(store.read(ReadRequest::new(PATH)).await.is_err());
        assert!(store.read(ReadRequest::new(PATH)).await.is_ok());
        assert_eq!(store.count(StoreOp::Read), 2);
    }

    // ── apply ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn apply_with_current_checksum_succeeds() {
        let store = store_with_rows(3);
        let before = store.checksum(Path::new(PATH)).unwrap();
        let result = store.apply(apply_request(Some(before.clone()))).await.unwrap();
        assert!(result.success);
        assert_eq!(result.edits_applied, 1);
        assert_ne!(result.new_checksum, before);
        assert_eq!(result.new_checksum, store.checksum(Path::new(PATH)).unwrap());
        let book = store.workbook(Path::new(PATH)).unwrap();
        assert_eq!(book.sheets[0].cell(0, 0), &CellValue::Number(42.0));
    }

    #[tokio::test]
    async fn apply_with_stale_checksum_is_rejected_as_data() {
        let store = store_with_rows(3);
        let stale = store.checksum(Path::new(PATH)).unwrap();
        store.modify(Path::new(PATH), |book| book.sheets[0].rows.push(Vec::new())).unwrap();
        let current = store.checksum(Path::new(PATH)).unwrap();

        let result = store.apply(apply_request(Some(stale))).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.edits_applied, 0);
        assert_eq!(result.new_checksum, current);
        assert!(result.errors[0].starts_with("File has been modified"));
        assert_eq!(store.checksum(Path::new(PATH)).unwrap(), current);
    }

    // ── watch ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn watched_modification_is_broadcast() {
        let store = store_with_rows(1);
        let mut rx = store.subscribe();
        store.watch(PathBuf::from(PATH), true).await.unwrap();
        store.watch(PathBuf::from(PATH), true).await.unwrap();
        assert!(store.is_watched(Path::new(PATH)));

        let checksum = store.modify(Path::new(PATH), |_| {}).unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.change_type, FileChangeType::Modified);
        assert_eq!(event.new_checksum, Some(checksum));

        store.watch(PathBuf::from(PATH), false).await.unwrap();
        store.modify(Path::new(PATH), |_| {}).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn watching_missing_file_fails() {
        let store = MemoryStore::new();
        let err = store.watch(PathBuf::from("/nope.json"), true).await.unwrap_err();
        assert!(matches!(err, StoreError::FileNotFound(_)));
        // Unwatching something never watched is fine.
        store.watch(PathBuf::from("/nope.json"), false).await.unwrap();
    }

    #[tokio::test]
    async fn removing_watched_file_broadcasts_deleted() {
        let store = store_with_rows(1);
        let mut rx = store.subscribe();
        store.watch(PathBuf::from(PATH), true).await.unwrap();
        assert!(store.remove(Path::new(PATH)).is_some());
        assert_eq!(rx.recv().await.unwrap().change_type, FileChangeType::Deleted);
    }
}
