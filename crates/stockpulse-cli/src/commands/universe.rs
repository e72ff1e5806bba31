use serde::Serialize;
use stockpulse_core::{ProviderId, Symbol, SymbolRange, Universe, UniverseName};

use crate::cli::UniverseArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct UniverseData {
    universe: UniverseName,
    provider: ProviderId,
    range: String,
    count: usize,
    symbols: Vec<Symbol>,
}

pub fn run(args: &UniverseArgs) -> Result<CommandResult, CliError> {
    let universe = Universe::builtin(args.name)?;
    let range = match &args.range {
        Some(raw) => SymbolRange::parse(raw)?,
        None => SymbolRange::full(),
    };
    let symbols = universe.partition(range);

    let data = UniverseData {
        universe: args.name,
        provider: args.name.provider(),
        range: range.to_string(),
        count: symbols.len(),
        symbols,
    };
    Ok(CommandResult::ok(serde_json::to_value(data)?))
}
