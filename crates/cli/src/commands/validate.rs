// `gridsync validate`: check a sheet against a column schema file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use gridsync_common::schema::SheetSchema;
use gridsync_common::types::ValidationResult;

use super::{block_on, file_panel, open};
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Workbook path.
    pub path: PathBuf,

    /// Schema file (`.toml` or `.json`).
    #[arg(long)]
    schema: PathBuf,

    /// Sheet name (defaults to the first sheet).
    #[arg(long)]
    sheet: Option<String>,

    /// Cell range to restrict validation to.
    #[arg(long)]
    range: Option<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: ValidateArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    match block_on(validate(args))? {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(if result.is_valid { ExitCode::Success } else { ExitCode::Invalid })
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

/// Parse a schema from TOML or JSON, chosen by file extension.
pub fn load_schema(path: &Path) -> anyhow::Result<SheetSchema> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file `{}`", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON schema in `{}`", path.display()))
    } else {
        toml::from_str(&text)
            .with_context(|| format!("invalid TOML schema in `{}`", path.display()))
    }
}

async fn validate(args: ValidateArgs) -> anyhow::Result<ValidationResult> {
    let schema = load_schema(&args.schema)?;
    let panel = file_panel();
    open(&panel, &args.path, args.sheet, args.range).await?;
    panel.set_schema(Some(schema));

    let result = panel.validate().await;
    if let Some(error) = panel.error() {
        anyhow::bail!("validation of {} failed: {error}", args.path.display());
    }
    Ok(result)
}

fn format_human(result: &ValidationResult) -> String {
    let mut lines = Vec::new();
    for error in &result.errors {
        lines.push(format!(
            "error   row {} col {}: {}",
            error.row + 1,
            error.column_name,
            error.message
        ));
    }
    for warning in &result.warnings {
        lines.push(format!(
            "warning row {} col {}: {}",
            warning.row + 1,
            warning.column_name,
            warning.message
        ));
    }
    let verdict = if result.is_valid { "valid" } else { "INVALID" };
    lines.push(format!(
        "{verdict}: {} rows checked, {} errors, {} warnings",
        result.rows_checked,
        result.errors.len(),
        result.warnings.len()
    ));
    lines.join("\n")
}
