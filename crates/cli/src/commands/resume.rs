// `gridsync resume`: restore the panel saved by the last `read` or `set`.

use anyhow::Context;
use clap::Args;
use gridsync_engine::config::ConfigStore;
use gridsync_engine::LoadOutcome;

use super::read::{self, ReadOutput};
use super::{block_on, file_panel, session_store, SESSION_PROVIDER};
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ResumeArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: ResumeArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let result = match session_store() {
        Some(session) => block_on(resume(&session))?,
        None => Err(anyhow::anyhow!("no home directory to keep sessions in")),
    };
    match result {
        Ok(value) => {
            output::print_output(format, &value, read::format_human)?;
            Ok(ExitCode::Success)
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn resume(session: &dyn ConfigStore) -> anyhow::Result<ReadOutput> {
    let config = session
        .get_config(SESSION_PROVIDER)
        .context("failed to load saved session")?
        .context("no saved session (run `gridsync read` first)")?;
    let path = config.file_path.clone();

    let panel = file_panel();
    match panel.restore(config).await {
        LoadOutcome::Loaded { .. } => Ok(ReadOutput::from_view(panel.view())),
        LoadOutcome::NoFile => anyhow::bail!("saved session has no open file"),
        LoadOutcome::Failed(e) => Err(anyhow::Error::new(e)).with_context(|| match &path {
            Some(path) => format!("failed to reopen {}", path.display()),
            None => "failed to reopen saved session".to_string(),
        }),
        other => anyhow::bail!("unexpected load outcome: {other:?}"),
    }
}
