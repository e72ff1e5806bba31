mod history;
mod refresh;
mod status;
mod universe;

use std::sync::Arc;

use serde_json::Value;
use stockpulse_core::{MemoryStore, RefreshStore, Settings, Warehouse};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    /// `false` renders the data but exits with status 1.
    pub success: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            success: true,
        }
    }

    pub fn failed(data: Value) -> Self {
        Self {
            data,
            success: false,
        }
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let settings = Settings::from_env()?;

    match &cli.command {
        Command::Refresh(args) => refresh::run(cli, args, &settings).await,
        Command::Status => status::run(cli, &settings).await,
        Command::History(args) => history::run(cli, args, &settings).await,
        Command::Universe(args) => universe::run(args),
    }
}

/// The warehouse, or `None` under `--dry-run`.
fn open_warehouse(cli: &Cli, settings: &Settings) -> Result<Option<Warehouse>, CliError> {
    if cli.dry_run {
        return Ok(None);
    }
    Ok(Some(Warehouse::open(settings.warehouse_config())?))
}

fn store_for(warehouse: Option<&Warehouse>) -> Arc<dyn RefreshStore> {
    match warehouse {
        Some(warehouse) => Arc::new(warehouse.clone()),
        None => Arc::new(MemoryStore::new()),
    }
}
