use stockpulse_core::{
    ProviderPolicy, RateLimiterRegistry, RefreshError, RefreshOrchestrator, RefreshReport,
    RefreshResult, Settings,
};
use tracing::error;

use crate::cli::{Cli, RefreshArgs, RefreshTarget};
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    cli: &Cli,
    args: &RefreshArgs,
    settings: &Settings,
) -> Result<CommandResult, CliError> {
    let mut config = settings.refresh_config();
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    let max_errors = config.max_reported_errors;

    let provider = args.target.universe().provider();
    let policy = ProviderPolicy::default_for(provider).with_overrides(args.rpm, args.daily_cap);
    let source = if cli.mock {
        settings.mock_source(&policy)
    } else {
        settings.live_source(&policy)?
    };

    let warehouse = super::open_warehouse(cli, settings)?;
    let limiters = RateLimiterRegistry::default();
    let orchestrator = RefreshOrchestrator::new(super::store_for(warehouse.as_ref()), config)
        .with_builtin_universes()?
        .with_source(source, &policy, &limiters)?;

    let outcome = match args.target {
        RefreshTarget::Range { start, end } => orchestrator
            .refresh_stocks_in_range(start, end)
            .await
            .map(|result| vec![result]),
        RefreshTarget::Tlv => orchestrator
            .refresh_tlv_stocks()
            .await
            .map(|result| vec![result]),
        RefreshTarget::All => orchestrator.refresh_all().await,
    };

    match outcome {
        Ok(results) => {
            let success = results.iter().all(|result| result.success);
            let data = reports_value(&results, max_errors)?;
            Ok(CommandResult { data, success })
        }
        Err(RefreshError::Store { result, source }) => {
            error!(run_id = %result.run_id, error = %source, "refresh finished but was not recorded");
            let report: RefreshReport = result.report(max_errors);
            Ok(CommandResult::failed(serde_json::to_value(report)?))
        }
        Err(other) => Err(other.into()),
    }
}

/// One report for a single run, an array for `refresh all`.
fn reports_value(
    results: &[RefreshResult],
    max_errors: usize,
) -> Result<serde_json::Value, CliError> {
    let reports: Vec<RefreshReport> = results
        .iter()
        .map(|result| result.report(max_errors))
        .collect();
    let value = match reports.as_slice() {
        [single] => serde_json::to_value(single)?,
        _ => serde_json::to_value(&reports)?,
    };
    Ok(value)
}
