//! CLI argument definitions for stockpulse.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `refresh range <START> <END>` | Refresh NASDAQ symbols by first letter |
//! | `refresh tlv` | Refresh the Tel Aviv universe |
//! | `refresh all` | Refresh NASDAQ `A-M` then `N-Z` |
//! | `status` | Warehouse freshness and provider quotas |
//! | `history` | Recent refresh runs |
//! | `universe <nasdaq\|tlv>` | List a bundled universe |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--mock` | `false` | Use offline deterministic data |
//! | `--dry-run` | `false` | Keep results in memory, skip the warehouse |
//! | `--log-format` | `pretty` | Log format on stderr (pretty, json) |
//! | `--log-level` | `info` | Base log level |
//!
//! # Examples
//!
//! ```bash
//! stockpulse refresh range A M
//! stockpulse refresh tlv --daily-cap 200 --pretty
//! stockpulse --mock --dry-run refresh all --format table
//! stockpulse history --limit 5
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use stockpulse_core::UniverseName;

/// Quota-aware stock fundamentals refresher.
#[derive(Debug, Parser)]
#[command(
    name = "stockpulse",
    author,
    version,
    about = "Quota-aware stock fundamentals refresher",
    long_about = "stockpulse refreshes fundamentals for a fixed NASDAQ and Tel Aviv universe \
from free-tier market data APIs, staying inside each provider's per-minute and daily quotas.\n\
\n\
Use 'stockpulse <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Serve provider calls from deterministic offline data.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// Keep refreshed rows and run history in memory only.
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// Log output format (logs go to stderr).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Base log level; `STOCKPULSE_LOG` or `RUST_LOG` take precedence.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON document.
    Json,
    /// Aligned text for terminals.
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Refresh stocks from the market data providers.
    ///
    /// # Examples
    ///
    ///   stockpulse refresh range A M
    ///   stockpulse refresh tlv
    ///   stockpulse refresh all --concurrency 2
    Refresh(RefreshArgs),

    /// Show warehouse freshness, row counts and provider quotas.
    Status,

    /// List recent refresh runs, newest first.
    History(HistoryArgs),

    /// Print the symbols of a bundled universe.
    Universe(UniverseArgs),
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    #[command(subcommand)]
    pub target: RefreshTarget,

    /// Override the provider's requests-per-minute quota.
    #[arg(long, global = true)]
    pub rpm: Option<u32>,

    /// Override the provider's daily request cap.
    #[arg(long, global = true)]
    pub daily_cap: Option<u32>,

    /// Symbols refreshed at once.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum RefreshTarget {
    /// NASDAQ symbols whose first letter lies in START..=END.
    Range { start: char, end: char },
    /// Every Tel Aviv symbol.
    Tlv,
    /// NASDAQ A-M, then N-Z.
    All,
}

impl RefreshTarget {
    pub const fn universe(self) -> UniverseName {
        match self {
            Self::Range { .. } | Self::All => UniverseName::Nasdaq,
            Self::Tlv => UniverseName::Tlv,
        }
    }
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Number of runs to show.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct UniverseArgs {
    /// Universe name (nasdaq or tlv).
    pub name: UniverseName,

    /// Restrict to a letter range such as `A-M`.
    #[arg(long)]
    pub range: Option<String>,
}
