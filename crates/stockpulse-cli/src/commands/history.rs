use serde::Serialize;
use stockpulse_core::{RunRecord, Settings};

use crate::cli::{Cli, HistoryArgs};
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct HistoryData {
    runs: Vec<RunRecord>,
}

pub async fn run(cli: &Cli, args: &HistoryArgs, settings: &Settings) -> Result<CommandResult, CliError> {
    let warehouse = super::open_warehouse(cli, settings)?;
    let store = super::store_for(warehouse.as_ref());
    let runs = store.run_history(args.limit).await?;
    Ok(CommandResult::ok(serde_json::to_value(HistoryData { runs })?))
}
