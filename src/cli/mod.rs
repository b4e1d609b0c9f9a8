use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser)]
#[command(name = "ledgerline")]
#[command(version, about = "Daily portfolio valuation from a transaction ledger")]
#[command(
    long_about = "Replay an account ledger into daily cash, holdings and value series, adjust historical quantities for stock splits, prune redundant valuations and report time- and money-weighted returns."
)]
pub struct Cli {
    /// Database file (defaults to ~/.ledgerline/data.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Configuration file (defaults to ~/.ledgerline/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Date range selection shared by the reporting commands
#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// First day (YYYY-MM-DD); defaults to the last day
    #[arg(long)]
    pub from: Option<String>,

    /// Last day (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub to: Option<String>,

    /// Period instead of from/to: MTD, QTD, YTD, 1Y, ALL, YYYY, or from:to
    #[arg(short, long, conflicts_with_all = ["from", "to"])]
    pub period: Option<String>,
}

/// Account selection for portfolio-wide commands
#[derive(Args, Debug, Clone, Default)]
pub struct AccountArgs {
    /// Restrict to these account ids (repeatable)
    #[arg(short, long = "account")]
    pub accounts: Vec<i64>,

    /// Leave closed accounts out
    #[arg(long)]
    pub open_only: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and default categories
    Init,

    /// Daily value and profit (one account in detail, or the whole portfolio)
    Value {
        #[command(flatten)]
        accounts: AccountArgs,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Daily cash flow of an account by category
    CashFlow {
        /// Account id
        account: i64,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Daily split-adjusted asset quantities of an account
    Quantities {
        /// Account id
        account: i64,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Time- and money-weighted returns
    Performance {
        #[command(flatten)]
        accounts: AccountArgs,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Stock split maintenance
    Splits {
        #[command(subcommand)]
        action: SplitCommands,
    },

    /// Valuation maintenance
    Valuations {
        #[command(subcommand)]
        action: ValuationCommands,
    },
}

#[derive(Subcommand)]
pub enum SplitCommands {
    /// Recompute split-adjusted quantities
    Recompute {
        /// Asset id (all assets when omitted)
        #[arg(short, long)]
        asset: Option<i64>,

        /// Preview only, don't save to database
        #[arg(short, long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
pub enum ValuationCommands {
    /// Delete valuations inside zero-holding windows
    Prune {
        /// Asset id (all assets when omitted)
        #[arg(short, long)]
        asset: Option<i64>,

        /// Preview only, don't save to database
        #[arg(short, long)]
        dry_run: bool,
    },
}
