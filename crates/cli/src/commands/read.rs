// `gridsync read`: print a window of rows, optionally the whole sheet.

use std::path::PathBuf;

use clap::Args;
use gridsync_common::cell::CellValue;
use gridsync_common::types::{ColumnInfo, SheetInfo};
use gridsync_engine::{LoadOutcome, PanelView};
use serde::{Deserialize, Serialize};

use gridsync_engine::config::ConfigStore;

use super::{block_on, file_panel, open, save_session, session_store};
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Workbook path.
    pub path: PathBuf,

    /// Sheet name (defaults to the first sheet).
    #[arg(long)]
    sheet: Option<String>,

    /// Cell range to restrict the read to (e.g. `A1:D50`).
    #[arg(long)]
    range: Option<String>,

    /// Keep paging until every row is loaded.
    #[arg(long)]
    all: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadOutput {
    pub path: PathBuf,
    pub sheet: String,
    pub sheets: Vec<SheetInfo>,
    pub checksum: String,
    pub total_rows: u32,
    pub offset: u32,
    pub has_more: bool,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ReadOutput {
    pub(crate) fn from_view(view: PanelView) -> Self {
        Self {
            path: view.file_path.unwrap_or_default(),
            sheet: view.active_sheet.unwrap_or_default(),
            sheets: view.sheets,
            checksum: view.checksum.unwrap_or_default(),
            total_rows: view.total_rows,
            offset: view.offset,
            has_more: view.has_more,
            columns: view.columns,
            rows: view.rows,
        }
    }
}

pub fn run(args: ReadArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let session = session_store();
    let session = session.as_ref().map(|s| s as &dyn ConfigStore);
    match block_on(read(args, session))? {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(ExitCode::Success)
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn read(args: ReadArgs, session: Option<&dyn ConfigStore>) -> anyhow::Result<ReadOutput> {
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
    save_session(session, &panel);
    Ok(ReadOutput::from_view(panel.view()))
}

pub(crate) fn format_human(result: &ReadOutput) -> String {
    let mut lines = Vec::new();
    lines.push(format!("# {} > {}", result.path.display(), result.sheet));
    lines.push(String::new());

    let header: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    lines.push(header.join("\t"));
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(CellValue::display).collect();
        lines.push(cells.join("\t"));
    }

    lines.push(String::new());
    let shown = result.rows.len() as u32;
    let footer = if shown == 0 {
        format!("0 of {} rows", result.total_rows)
    } else {
        let first = result.offset + 1;
        format!("rows {first}-{} of {}", result.offset + shown, result.total_rows)
    };
    let more = if result.has_more { " (more available, use --all)" } else { "" };
    lines.push(format!("{footer}{more}"));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsync_engine::store::file::JsonFileStore;
    use gridsync_engine::workbook::{Sheet, Workbook};

    fn column(index: u32, name: &str) -> ColumnInfo {
        ColumnInfo { index, name: name.into(), header: None, width: None, data_type: None }
    }

    fn sample() -> ReadOutput {
        ReadOutput {
            path: PathBuf::from("/data/orders.json"),
            sheet: "Orders".into(),
            sheets: Vec::new(),
            checksum: "abc".into(),
            total_rows: 10,
            offset: 0,
            has_more: true,
            columns: vec![column(0, "A"), column(1, "B")],
            rows: vec![
                vec![CellValue::String("Item".into()), CellValue::String("Qty".into())],
                vec![CellValue::String("Widget".into()), CellValue::Number(3.0)],
            ],
        }
    }

    #[test]
    fn human_format_lists_rows_and_position() {
        let output = format_human(&sample());
        assert!(output.contains("# /data/orders.json > Orders"));
        assert!(output.contains("A\tB"));
        assert!(output.contains("Widget\t3"));
        assert!(output.contains("rows 1-2 of 10 (more available, use --all)"));
    }

    #[test]
    fn human_format_empty_sheet() {
        let mut empty = sample();
        empty.rows.clear();
        empty.total_rows = 0;
        empty.has_more = false;
        assert!(format_human(&empty).ends_with("0 of 0 rows"));
    }

    #[test]
    fn json_format_roundtrips() {
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &sample(), format_human).unwrap();
        let parsed: ReadOutput = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed.sheet, "Orders");
        assert_eq!(parsed.rows[1][1], CellValue::Number(3.0));
    }

    #[test]
    fn read_all_pages_through_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("big.json");
        let rows = (0..2500).map(|r| vec![CellValue::Number(f64::from(r))]).collect();
        JsonFileStore::write_workbook(&path, &Workbook::new(vec![Sheet::new("Data", rows)]))
            .unwrap();

        let args = ReadArgs { path: path.clone(), sheet: None, range: None, all: true, json: true };
        let result = block_on(read(args, None)).unwrap().unwrap();
        assert_eq!(result.rows.len(), 2500);
        assert!(!result.has_more);
        assert_eq!(result.sheet, "Data");
    }

    #[test]
    fn read_range_narrows_window() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("small.json");
        let rows = (0..20)
            .map(|r| vec![CellValue::Number(f64::from(r)), CellValue::Number(f64::from(r * 2))])
            .collect();
        JsonFileStore::write_workbook(&path, &Workbook::new(vec![Sheet::new("Data", rows)]))
            .unwrap();

        let args = ReadArgs {
            path,
            sheet: None,
            range: Some("B3:B5".into()),
            all: false,
            json: true,
        };
        let result = block_on(read(args, None)).unwrap().unwrap();
        assert_eq!(result.total_rows, 3);
        assert_eq!(result.rows, vec![
            vec![CellValue::Number(4.0)],
            vec![CellValue::Number(6.0)],
            vec![CellValue::Number(8.0)],
        ]);
    }

    #[test]
    fn read_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ReadArgs {
            path: tmp.path().join("nope.json"),
            sheet: None,
            range: None,
            all: false,
            json: true,
        };
        let err = block_on(read(args, None)).unwrap().unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }
}
