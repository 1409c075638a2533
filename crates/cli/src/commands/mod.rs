// CLI subcommand dispatch and the panel plumbing the commands share.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use gridsync_engine::config::{ConfigStore, FileConfigStore, GlobalConfig};
use gridsync_engine::store::file::JsonFileStore;
use gridsync_engine::{LoadOutcome, Panel};
use tracing::{debug, warn};

use crate::exit_code::ExitCode;

pub mod backup;
pub mod checksum;
pub mod export;
pub mod read;
pub mod resume;
pub mod set;
pub mod validate;
pub mod watch;

#[derive(Subcommand)]
pub enum Command {
    /// Print a window of rows from a workbook
    Read(read::ReadArgs),
    /// Check a sheet against a column schema
    Validate(validate::ValidateArgs),
    /// Write cell values, refusing if the file changed underneath
    Set(set::SetArgs),
    /// Print change events for a workbook until interrupted
    Watch(watch::WatchArgs),
    /// Print the SHA-256 checksum of a workbook
    Checksum(checksum::ChecksumArgs),
    /// Copy a workbook to a timestamped backup next to it
    Backup(backup::BackupArgs),
    /// Write a window of rows to a new workbook
    Export(export::ExportArgs),
    /// Re-open the file, sheet and range of the last `read` or `set`
    Resume(resume::ResumeArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<ExitCode> {
    match cmd {
        Command::Read(args) => read::run(args),
        Command::Validate(args) => validate::run(args),
        Command::Set(args) => set::run(args),
        Command::Watch(args) => watch::run(args),
        Command::Checksum(args) => checksum::run(args),
        Command::Backup(args) => backup::run(args),
        Command::Export(args) => export::run(args),
        Command::Resume(args) => resume::run(args),
    }
}

/// Drive `future` on a fresh current-thread runtime.
pub(crate) fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

/// Build a panel over the JSON file store using the global configuration.
pub(crate) fn file_panel() -> Panel<JsonFileStore> {
    let config = GlobalConfig::load();
    debug!(
        chunk_size = config.panel.chunk_size,
        timeout_ms = config.panel.request_timeout_ms,
        "loaded global config"
    );
    let store = Arc::new(JsonFileStore::new(config.file_store_options()));
    Panel::with_settings(store, config.panel_settings())
}

/// Open `path` on `panel`, optionally narrowed to a range.
pub(crate) async fn open(
    panel: &Panel<JsonFileStore>,
    path: &Path,
    sheet: Option<String>,
    range: Option<String>,
) -> anyhow::Result<()> {
    match panel.open_range(path, sheet, range).await {
        LoadOutcome::Loaded { .. } => Ok(()),
        LoadOutcome::Failed(e) => {
            Err(anyhow::Error::new(e)).with_context(|| format!("failed to open {}", path.display()))
        }
        other => anyhow::bail!("unexpected load outcome for {}: {other:?}", path.display()),
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// Provider name the CLI keeps its last panel configuration under.
pub(crate) const SESSION_PROVIDER: &str = "cli";

/// `~/.gridsync/panels/`, if a home directory is known.
pub(crate) fn session_store() -> Option<FileConfigStore> {
    FileConfigStore::default_location()
}

/// Remember where `panel` is so `gridsync resume` can return to it. A
/// failed save is logged and otherwise ignored.
pub(crate) fn save_session(session: Option<&dyn ConfigStore>, panel: &Panel<JsonFileStore>) {
    let Some(session) = session else {
        return;
    };
    match session.save_config(SESSION_PROVIDER, &panel.config()) {
        Ok(()) => debug!(provider = SESSION_PROVIDER, "session saved"),
        Err(e) => warn!(provider = SESSION_PROVIDER, error = %e, "failed to save session"),
    }
}
