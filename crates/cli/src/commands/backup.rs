// `gridsync backup`: copy a workbook to `<path>.backup.<timestamp>`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use gridsync_engine::store::file::JsonFileStore;
use serde::{Deserialize, Serialize};

use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct BackupArgs {
    /// Workbook path.
    pub path: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOutput {
    pub path: PathBuf,
    pub backup: PathBuf,
}

pub fn run(args: BackupArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    match backup(args) {
        Ok(value) => {
            output::print_output(format, &value, format_human)?;
            Ok(ExitCode::Success)
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn format_human(result: &BackupOutput) -> String {
    format!("Backed up {} to {}", result.path.display(), result.backup.display())
}

fn backup(args: BackupArgs) -> anyhow::Result<BackupOutput> {
    let backup = JsonFileStore::backup(&args.path)
        .with_context(|| format!("failed to back up {}", args.path.display()))?;
    Ok(BackupOutput { path: args.path, backup })
}
