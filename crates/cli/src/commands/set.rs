// `gridsync set`: buffer `A1=value` assignments and apply them under the
// checksum read at open time.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use gridsync_common::address::CellAddress;
use gridsync_engine::config::ConfigStore;
use gridsync_engine::ApplyOutcome;
use serde::{Deserialize, Serialize};

use super::{block_on, file_panel, open, save_session, session_store};
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Workbook path.
    pub path: PathBuf,

    /// Assignments such as `B2=42` or `C7=hello`. An empty value clears the cell.
    #[arg(required = true, num_args = 1..)]
    assignments: Vec<String>,

    /// Sheet name (defaults to the first sheet).
    #[arg(long)]
    sheet: Option<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetOutput {
    pub path: PathBuf,
    pub applied: bool,
    pub edits_applied: u32,
    pub checksum: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

pub fn run(args: SetArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let session = session_store();
    let session = session.as_ref().map(|s| s as &dyn ConfigStore);
    match block_on(set(args, session))? {
        Ok((result, code)) => {
            output::print_output(format, &result, format_human)?;
            Ok(code)
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

/// Split `B2=42` into its address and raw value.
pub fn parse_assignment(text: &str) -> anyhow::Result<(CellAddress, String)> {
    let (address, value) = text
        .split_once('=')
        .with_context(|| format!("assignment `{text}` is not of the form CELL=VALUE"))?;
    let address = CellAddress::parse(address)
        .with_context(|| format!("invalid cell in assignment `{text}`"))?;
    Ok((address, value.to_string()))
}

async fn set(
    args: SetArgs,
    session: Option<&dyn ConfigStore>,
) -> anyhow::Result<(SetOutput, ExitCode)> {
    let assignments = args
        .assignments
        .iter()
        .map(|a| parse_assignment(a))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let panel = file_panel();
    open(&panel, &args.path, args.sheet, None).await?;
    for (address, value) in assignments {
        panel.add_pending_edit(address.row, address.col, value);
    }

    let outcome = panel.apply_edits().await;
    save_session(session, &panel);
    match outcome {
        ApplyOutcome::Applied { edits_applied, new_checksum } => Ok((
            SetOutput {
                path: args.path,
                applied: true,
                edits_applied,
                checksum: new_checksum,
                errors: Vec::new(),
            },
            ExitCode::Success,
        )),
        ApplyOutcome::Rejected { errors, current_checksum } => {
            let code = if panel.has_file_changed() { ExitCode::Conflict } else { ExitCode::Error };
            Ok((
                SetOutput {
                    path: args.path,
                    applied: false,
                    edits_applied: 0,
                    checksum: current_checksum,
                    errors,
                },
                code,
            ))
        }
        ApplyOutcome::Failed(e) => Err(anyhow::Error::new(e))
            .with_context(|| format!("failed to apply edits to {}", args.path.display())),
        other => anyhow::bail!("unexpected apply outcome: {other:?}"),
    }
}

fn format_human(result: &SetOutput) -> String {
    if result.applied {
        return format!(
            "Applied {} edits to {} (checksum: {})",
            result.edits_applied,
            result.path.display(),
            result.checksum
        );
    }
    let mut lines = vec![format!("Rejected: no edits applied to {}", result.path.display())];
    lines.extend(result.errors.iter().map(|e| format!("  {e}")));
    lines.join("\n")
}
