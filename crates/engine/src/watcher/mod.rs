// Single-file watcher: notify → debounce → checksum → FileChangeEvent.
//
// This module handles the first stage: raw OS event detection for one
// workbook file. The watcher observes the file's parent directory (so
// atomic saves that replace the file are still seen) and filters events
// down to the target file name.

pub mod debounce;
pub mod hash;
pub mod pump;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::store::StoreError;

/// Raw event kinds that matter for a watched workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEventKind {
    /// Content written, file created or replaced.
    Modify,
    /// File deleted.
    Remove,
    /// File moved away from its path.
    RenameAway,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// OS-native watcher for one file. Stops when dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    target: PathBuf,
}

impl FileWatcher {
    /// Start watching `path`. Fails if the file does not exist.
    pub fn start(path: &Path) -> Result<(Self, mpsc::Receiver<RawFsEvent>), StoreError> {
        let target = path.canonicalize().map_err(|_| StoreError::file_not_found(path))?;
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::Watch(format!("{} has no parent", target.display())))?;
        let file_name = target
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| StoreError::Watch(format!("{} has no file name", target.display())))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let target_for_filter = target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Some(kind) = translate_event(&event, &file_name) {
                    let raw = RawFsEvent { kind, path: target_for_filter.clone() };
                    if tx.blocking_send(raw).is_err() {
                        debug!("watch channel closed, dropping event");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "file watcher error");
            }
        })
        .map_err(|e| StoreError::Watch(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| StoreError::Watch(format!("failed to watch {}: {e}", parent.display())))?;

        debug!(path = %target.display(), "file watcher started");
        Ok((Self { _watcher: watcher, target }, rx))
    }

    /// Canonicalized path of the watched file.
    pub fn target(&self) -> &Path {
        &self.target
    }
}

/// Map a notify event to a change of the file named `file_name`.
fn translate_event(event: &Event, file_name: &OsString) -> Option<FsEventKind> {
    let touches_target = event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()));
    if !touches_target {
        return None;
    }

    match &event.kind {
        EventKind::Create(_) => Some(FsEventKind::Modify),
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            trace!("skipping metadata-only modify event");
            None
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FsEventKind::RenameAway),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]: moving the target away vs. replacing it.
            let moved_away = event.paths.first().and_then(|p| p.file_name())
                == Some(file_name.as_os_str());
            if moved_away {
                Some(FsEventKind::RenameAway)
            } else {
                Some(FsEventKind::Modify)
            }
        }
        EventKind::Modify(_) => Some(FsEventKind::Modify),
        EventKind::Remove(_) => Some(FsEventKind::Remove),
        _ => {
            trace!(kind = ?event.kind, "skipping non-content event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    fn make_event(kind: EventKind, paths: &[&str]) -> Event {
        Event { kind, paths: paths.iter().map(PathBuf::from).collect(), attrs: Default::default() }
    }

    fn name() -> OsString {
        OsString::from("book.json")
    }

    // ── translate_event ────────────────────────────────────────────

    #[test]
    fn data_change_on_target_is_modify() {
        let event = make_event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/data/book.json"],
        );
        assert_eq!(translate_event(&event, &name()), Some(FsEventKind::Modify));
    }

    #[test]
    fn create_counts_as_modify() {
        let event = make_event(EventKind::Create(CreateKind::File), &["/data/book.json"]);
        assert_eq!(translate_event(&event, &name()), Some(FsEventKind::Modify));
    }

    #[test]
    fn remove_is_remove() {
        let event = make_event(EventKind::Remove(RemoveKind::File), &["/data/book.json"]);
        assert_eq!(translate_event(&event, &name()), Some(FsEventKind::Remove));
    }

    #[test]
    fn sibling_files_are_ignored() {
        let event = make_event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/data/other.json", "/data/book.json.tmp"],
        );
        assert_eq!(translate_event(&event, &name()), None);
    }

    #[test]
    fn metadata_and_access_events_are_ignored() {
        let metadata = make_event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/data/book.json"],
        );
        assert_eq!(translate_event(&metadata, &name()), None);

        let access = make_event(EventKind::Access(AccessKind::Read), &["/data/book.json"]);
        assert_eq!(translate_event(&access, &name()), None);
    }

    #[test]
    fn rename_away_vs_replace() {
        let away = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/data/book.json", "/data/archive.json"],
        );
        assert_eq!(translate_event(&away, &name()), Some(FsEventKind::RenameAway));

        let replaced = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/data/book.json.tmp", "/data/book.json"],
        );
        assert_eq!(translate_event(&replaced, &name()), Some(FsEventKind::Modify));

        let from = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/data/book.json"],
        );
        assert_eq!(translate_event(&from, &name()), Some(FsEventKind::RenameAway));
    }

    // ── FileWatcher against the real filesystem ────────────────────

    #[test]
    fn start_rejects_missing_file() {
        let result = FileWatcher::start(Path::new("/nonexistent/gridsync/book.json"));
        assert!(matches!(result, Err(StoreError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn detects_modification_of_target() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book.json");
        fs::write(&path, "{}").unwrap();

        let (watcher, mut rx) = FileWatcher::start(&path).unwrap();
        assert_eq!(watcher.target(), path.canonicalize().unwrap());
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(tmp.path().join("unrelated.json"), "{}").unwrap();
        fs::write(&path, "{\"sheets\":[]}").unwrap();

        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for modify event")
            .expect("channel closed");
        assert_eq!(event.kind, FsEventKind::Modify);
        assert!(event.path.ends_with("book.json"));

        drop(watcher);
    }

    #[tokio::test]
    async fn detects_removal_of_target() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book.json");
        fs::write(&path, "{}").unwrap();

        let (watcher, mut rx) = FileWatcher::start(&path).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::remove_file(&path).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut found_remove = false;
        while tokio::time::Instant::now() < deadline {
            match timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(event)) if event.kind == FsEventKind::Remove => {
                    found_remove = true;
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(found_remove, "expected a Remove event for book.json");

        drop(watcher);
    }
}
