// Integration test: panel + JSON file store + OS file watcher.
//
// 1. Open a workbook on disk and start watching it.
// 2. Rewrite the file from outside → the panel is flagged, not reloaded.
// 3. Apply edits through the panel → no change notification for our write.
// 4. Delete the file → a Deleted notification arrives.
// 5. Edits the JSON format cannot hold are refused before any write.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gridsync_common::cell::CellValue;
use gridsync_common::types::{FileChangeEvent, FileChangeType};
use gridsync_engine::store::file::{FileStoreOptions, JsonFileStore};
use gridsync_engine::store::TabularStore;
use gridsync_engine::watcher::debounce::DebounceConfig;
use gridsync_engine::watcher::hash::checksum_file;
use gridsync_engine::watcher::pump::PumpConfig;
use gridsync_engine::workbook::{Sheet, Workbook};
use gridsync_engine::{ApplyOutcome, LoadOutcome, Panel, WatchOutcome};
use tokio::sync::broadcast;

// ── Test infrastructure ──────────────────────────────────────────────

fn scores(first: f64) -> Workbook {
    Workbook::new(vec![Sheet::new(
        "Scores",
        vec![
            vec![CellValue::String("Name".into()), CellValue::String("Score".into())],
            vec![CellValue::String("Ada".into()), CellValue::Number(first)],
            vec![CellValue::String("Grace".into()), CellValue::Number(7.0)],
        ],
    )])
}

fn fast_store() -> Arc<JsonFileStore> {
    Arc::new(JsonFileStore::new(FileStoreOptions {
        backup_before_apply: false,
        pump: PumpConfig {
            debounce: DebounceConfig::with_millis(50),
            poll_interval: Duration::from_millis(20),
        },
    }))
}

fn seed(tmp: &tempfile::TempDir) -> PathBuf {
    // Canonical so the watched path matches what the OS reports.
    let dir = tmp.path().canonicalize().unwrap();
    let path = dir.join("scores.json");
    JsonFileStore::write_workbook(&path, &scores(10.0)).unwrap();
    path
}

async fn next_event(rx: &mut broadcast::Receiver<FileChangeEvent>) -> FileChangeEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for change event")
        .expect("change channel closed")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

async fn settle() {
    // Give the OS watcher time to register before touching the file.
    tokio::time::sleep(Duration::from_millis(200)).await;
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_rewrite_flags_panel() {
    let tmp = tempfile::tempdir().unwrap();
    let path = seed(&tmp);
    let store = fast_store();
    let mut events = store.subscribe();
    let panel = Arc::new(Panel::new(store.clone()));
    let _listener = panel.spawn_change_listener();

    assert!(matches!(panel.open(&path, None).await, LoadOutcome::Loaded { .. }));
    assert_eq!(panel.toggle_watch().await, WatchOutcome::Watching);
    assert!(store.is_watched(&path));
    settle().await;

    JsonFileStore::write_workbook(&path, &scores(99.0)).unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.path, path);
    assert_eq!(event.change_type, FileChangeType::Modified);
    assert_eq!(event.new_checksum, Some(checksum_file(&path).unwrap()));

    wait_until(|| panel.has_file_changed()).await;
    // Flagged only: the window still shows what was read.
    assert_eq!(panel.view().rows[1][1], CellValue::Number(10.0));

    assert!(matches!(panel.refresh().await, LoadOutcome::Loaded { .. }));
    let view = panel.view();
    assert!(!view.has_file_changed);
    assert_eq!(view.rows[1][1], CellValue::Number(99.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn own_apply_is_not_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let path = seed(&tmp);
    let store = fast_store();
    let mut events = store.subscribe();
    let panel = Arc::new(Panel::new(store.clone()));
    let _listener = panel.spawn_change_listener();

    panel.open(&path, None).await;
    panel.toggle_watch().await;
    settle().await;

    panel.add_pending_edit(1, 1, "12");
    let outcome = panel.apply_edits().await;
    let ApplyOutcome::Applied { new_checksum, .. } = outcome else {
        panic!("expected Applied, got {outcome:?}");
    };
    assert_eq!(new_checksum, checksum_file(&path).unwrap());

    // Longer than debounce + poll, so the pump has looked at our write.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    assert!(!panel.has_file_changed());

    let (book, _, _) = JsonFileStore::load_workbook(&path).unwrap();
    assert_eq!(book.sheets[0].cell(1, 1), &CellValue::Number(12.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_watched_file_reports_deleted() {
    let tmp = tempfile::tempdir().unwrap();
    let path = seed(&tmp);
    let store = fast_store();
    let mut events = store.subscribe();

    store.watch(path.clone(), true).await.unwrap();
    settle().await;

    std::fs::remove_file(&path).unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.path, path);
    assert_eq!(event.change_type, FileChangeType::Deleted);
    assert!(event.new_checksum.is_none());

    store.watch(path.clone(), false).await.unwrap();
    assert!(!store.is_watched(Path::new(&path)));
}

#[tokio::test]
async fn stale_apply_against_disk_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = seed(&tmp);
    let store = fast_store();
    let panel = Panel::new(store.clone());

    panel.open(&path, None).await;
    JsonFileStore::write_workbook(&path, &scores(50.0)).unwrap();
    panel.add_pending_edit(2, 1, 1.0);

    let outcome = panel.apply_edits().await;
    assert!(matches!(outcome, ApplyOutcome::Rejected { .. }), "got {outcome:?}");
    assert_eq!(panel.pending_edits().len(), 1);

    // The outside write survives untouched.
    let (book, _, _) = JsonFileStore::load_workbook(&path).unwrap();
    assert_eq!(book.sheets[0].cell(1, 1), &CellValue::Number(50.0));
    assert_eq!(book.sheets[0].cell(2, 1), &CellValue::Number(7.0));
}

#[tokio::test]
async fn non_finite_edit_never_reaches_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let path = seed(&tmp);
    let before = std::fs::read(&path).unwrap();
    let panel = Panel::new(fast_store());

    panel.open(&path, None).await;
    panel.add_pending_edit(0, 0, f64::NAN);
    panel.add_pending_edit(1, 1, 11.0);

    let outcome = panel.apply_edits().await;
    let ApplyOutcome::Rejected { errors, .. } = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(errors, vec!["Row 0, Col 0: number must be finite".to_string()]);
    assert_eq!(panel.pending_edits().len(), 2);
    assert!(!panel.has_file_changed());
    assert_eq!(std::fs::read(&path).unwrap(), before);

    // Still readable by a fresh panel.
    let reopened = Panel::new(fast_store());
    assert!(matches!(reopened.open(&path, None).await, LoadOutcome::Loaded { .. }));
}
