// `gridsync watch`: stream change events for one workbook until Ctrl-C.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use gridsync_common::types::{FileChangeEvent, FileChangeType};
use gridsync_engine::store::TabularStore;
use gridsync_engine::WatchOutcome;
use tokio::sync::broadcast::error::RecvError;

use super::{block_on, file_panel, open};
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Workbook path.
    pub path: PathBuf,

    /// Force JSON output (one event per line).
    #[arg(long)]
    json: bool,
}

pub fn run(args: WatchArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    match block_on(watch(args, format))? {
        Ok(()) => Ok(ExitCode::Success),
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn watch(args: WatchArgs, format: OutputFormat) -> anyhow::Result<()> {
    let path = args
        .path
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", args.path.display()))?;
    let panel = file_panel();
    let mut events = panel.store().subscribe();
    open(&panel, &path, None, None).await?;

    match panel.toggle_watch().await {
        WatchOutcome::Watching => {}
        WatchOutcome::Failed(e) => {
            return Err(anyhow::Error::new(e))
                .with_context(|| format!("failed to watch {}", path.display()));
        }
        other => anyhow::bail!("unexpected watch outcome: {other:?}"),
    }
    output::print_warning(
        format,
        "WATCHING",
        &format!("watching {} (Ctrl-C to stop)", path.display()),
    );

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if event.path == path {
                        output::print_output(format, &event, format_human)?;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    let message = format!("missed {missed} change events");
                    output::print_warning(format, "LAGGED", &message);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    panel.close().await;
    Ok(())
}

fn format_human(event: &FileChangeEvent) -> String {
    let kind = match event.change_type {
        FileChangeType::Modified => "modified",
        FileChangeType::Deleted => "deleted",
        FileChangeType::Renamed => "renamed",
    };
    match &event.new_checksum {
        Some(checksum) => format!("{kind} {} (checksum: {checksum})", event.path.display()),
        None => format!("{kind} {}", event.path.display()),
    }
}
