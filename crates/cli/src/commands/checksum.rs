// `gridsync checksum`: print the SHA-256 the stores compare edits against.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use gridsync_engine::watcher::hash::checksum_file;
use serde::{Deserialize, Serialize};

use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ChecksumArgs {
    /// Workbook path.
    pub path: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumOutput {
    pub path: PathBuf,
    pub checksum: String,
}

pub fn run(args: ChecksumArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let result = checksum_file(&args.path)
        .with_context(|| format!("failed to checksum {}", args.path.display()));
    match result {
        Ok(checksum) => {
            let value = ChecksumOutput { path: args.path, checksum };
            output::print_output(format, &value, |o| {
                format!("{}  {}", o.checksum, o.path.display())
            })?;
            Ok(ExitCode::Success)
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}
