use serde::Serialize;
use stockpulse_core::{
    ProviderId, ProviderPolicy, RunRecord, Settings, Universe, UniverseName, UtcDateTime,
};

use crate::cli::Cli;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct StatusData {
    warehouse: Option<String>,
    stock_count: u64,
    last_updated: Option<UtcDateTime>,
    universes: Vec<UniverseStatus>,
    providers: Vec<ProviderStatus>,
    last_run: Option<RunRecord>,
}

#[derive(Debug, Serialize)]
struct UniverseStatus {
    universe: UniverseName,
    provider: ProviderId,
    symbols: usize,
    stored: u64,
}

#[derive(Debug, Serialize)]
struct ProviderStatus {
    provider: ProviderId,
    requests_per_minute: u32,
    requests_per_day: Option<u32>,
    api_key_configured: bool,
}

pub async fn run(cli: &Cli, settings: &Settings) -> Result<CommandResult, CliError> {
    let warehouse = super::open_warehouse(cli, settings)?;
    let store = super::store_for(warehouse.as_ref());

    let stored_by_universe = match &warehouse {
        Some(warehouse) => warehouse.stock_count_by_universe()?,
        None => Vec::new(),
    };

    let mut universes = Vec::new();
    for name in [UniverseName::Nasdaq, UniverseName::Tlv] {
        let stored = stored_by_universe
            .iter()
            .find(|(universe, _)| universe == name.as_str())
            .map_or(0, |(_, count)| *count);
        universes.push(UniverseStatus {
            universe: name,
            provider: name.provider(),
            symbols: Universe::builtin(name)?.len(),
            stored,
        });
    }

    let providers = ProviderId::ALL
        .into_iter()
        .map(|provider| {
            let policy = ProviderPolicy::default_for(provider);
            ProviderStatus {
                provider,
                requests_per_minute: policy.requests_per_minute,
                requests_per_day: policy.requests_per_day,
                api_key_configured: settings.api_key(provider).is_some(),
            }
        })
        .collect();

    let data = StatusData {
        warehouse: warehouse
            .as_ref()
            .map(|warehouse| warehouse.db_path().display().to_string()),
        stock_count: store.stock_count().await?,
        last_updated: store.last_updated().await?,
        universes,
        providers,
        last_run: store.run_history(1).await?.into_iter().next(),
    };

    Ok(CommandResult::ok(serde_json::to_value(data)?))
}
