// `gridsync export`: write the rows a panel has loaded to a new workbook.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use gridsync_engine::store::file::JsonFileStore;
use gridsync_engine::LoadOutcome;
use serde::{Deserialize, Serialize};

use super::{block_on, file_panel, open};
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Workbook to read from.
    pub path: PathBuf,

    /// New workbook to write.
    pub output: PathBuf,

    /// Sheet name (defaults to the first sheet).
    #[arg(long)]
    sheet: Option<String>,

    /// Cell range to export (e.g. `A1:D50`).
    #[arg(long)]
    range: Option<String>,

    /// Export every row rather than the first chunk.
    #[arg(long)]
    all: bool,

    /// Replace `output` if it already exists.
    #[arg(long)]
    force: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutput {
    pub output: PathBuf,
    pub sheet: String,
    pub rows: u32,
    pub checksum: String,
}

pub fn run(args: ExportArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    match block_on(export(args))? {
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

fn format_human(result: &ExportOutput) -> String {
    format!(
        "Exported {} rows to {} (checksum: {})",
        result.rows,
        result.output.display(),
        result.checksum
    )
}

async fn export(args: ExportArgs) -> anyhow::Result<ExportOutput> {
    if args.output.exists() && !args.force {
        anyhow::bail!("{} already exists (use --force to replace it)", args.output.display());
    }
    let panel = file_panel();
    open(&panel, &args.path, args.sheet, args.range).await?;
    if args.all {
        loop {
            match panel.load_more().await {
                LoadOutcome::Appended { .. } => continue,
                LoadOutcome::Failed(e) => return Err(e.into()),
                _ => break,
            }
        }
    }

    let view = panel.view();
    let sheet = view.active_sheet.unwrap_or_default();
    let checksum = JsonFileStore::export_window(&args.output, &sheet, &view.columns, &view.rows)
        .with_context(|| format!("failed to export to {}", args.output.display()))?;
    Ok(ExportOutput { output: args.output, sheet, rows: view.rows.len() as u32, checksum })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsync_common::cell::CellValue;
    use gridsync_engine::watcher::hash::checksum_file;
    use gridsync_engine::workbook::{Sheet, Workbook};

    fn seed(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("source.json");
        let rows = (0..30)
            .map(|r| vec![CellValue::Number(f64::from(r)), CellValue::String(format!("row-{r}"))])
            .collect();
        JsonFileStore::write_workbook(&path, &Workbook::new(vec![Sheet::new("Data", rows)]))
            .unwrap();
        path
    }

    fn args(path: PathBuf, output: PathBuf, range: Option<&str>) -> ExportArgs {
        ExportArgs {
            path,
            output,
            sheet: None,
            range: range.map(str::to_string),
            all: false,
            force: false,
            json: true,
        }
    }

    #[test]
    fn exports_range_to_new_workbook() {
        let tmp = tempfile::tempdir().unwrap();
        let source = seed(tmp.path());
        let target = tmp.path().join("subset.json");

        let result = block_on(export(args(source, target.clone(), Some("B5:B9"))))
            .unwrap()
            .unwrap();
        assert_eq!(result.rows, 5);
        assert_eq!(result.sheet, "Data");
        assert_eq!(result.checksum, checksum_file(&target).unwrap());

        let (book, _, _) = JsonFileStore::load_workbook(&target).unwrap();
        assert_eq!(book.sheets[0].name, "Data");
        assert_eq!(book.sheets[0].cell(0, 0), &CellValue::String("row-4".into()));
        assert_eq!(book.sheets[0].row_count(), 5);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let source = seed(tmp.path());
        let target = tmp.path().join("taken.json");
        std::fs::write(&target, b"keep me").unwrap();

        let err = block_on(export(args(source.clone(), target.clone(), None)))
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read(&target).unwrap(), b"keep me");

        let mut forced = args(source, target.clone(), None);
        forced.force = true;
        let result = block_on(export(forced)).unwrap().unwrap();
        assert_eq!(result.rows, 30);
        assert_eq!(result.checksum, checksum_file(&target).unwrap());
    }
}
