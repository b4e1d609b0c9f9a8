//! Command dispatcher that routes parsed clap commands to the library
//! calls and the terminal formatters.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use colored::Colorize;
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::info;

use crate::cli::{
    formatters, AccountArgs, Cli, Commands, RangeArgs, SplitCommands, ValuationCommands,
};
use ledgerline::config::EngineConfig;
use ledgerline::corporate_actions::recompute_splits;
use ledgerline::db::{self, Account, Asset};
use ledgerline::pricing::prune::prune_valuations;
use ledgerline::reports::{self, AccountFilter, Period};
use ledgerline::series::DateRange;
use ledgerline::source::LedgerSource;
use ledgerline::utils::parse_date;

/// Route a parsed command line to its handler
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = EngineConfig::load(cli.config.as_deref())?;
    let db_path: Option<PathBuf> = cli.db.clone().or_else(|| config.storage.db_path.clone());

    db::init_database(db_path.clone())?;
    let mut conn = db::open_db(db_path)?;
    let json = cli.json;

    match cli.command {
        Commands::Init => {
            println!("{} Database ready", "✓".green().bold());
            Ok(())
        }
        Commands::Value { accounts, range } => {
            dispatch_value(&conn, &config, &accounts, &range, json)
        }
        Commands::CashFlow { account, range } => {
            dispatch_cash_flow(&conn, &config, account, &range, json)
        }
        Commands::Quantities { account, range } => {
            dispatch_quantities(&conn, &config, account, &range, json)
        }
        Commands::Performance { accounts, range } => {
            dispatch_performance(&conn, &config, &accounts, &range, json)
        }
        Commands::Splits { action } => match action {
            SplitCommands::Recompute { asset, dry_run } => {
                dispatch_recompute(&mut conn, &config, asset, dry_run, json)
            }
        },
        Commands::Valuations { action } => match action {
            ValuationCommands::Prune { asset, dry_run } => {
                dispatch_prune(&mut conn, asset, dry_run, json)
            }
        },
    }
}

/// Resolve `--period` or `--from`/`--to` into concrete dates.
///
/// Without a period, `--to` defaults to today and `--from` to `--to`.
fn resolve_range(
    conn: &Connection,
    args: &RangeArgs,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    if let Some(period) = &args.period {
        let period: Period = period.parse()?;
        return reports::performance::get_period_dates(
            period,
            today,
            conn.first_transaction_date()?,
        );
    }

    let end = match &args.to {
        Some(s) => parse_date(s)?,
        None => today,
    };
    let start = match &args.from {
        Some(s) => parse_date(s)?,
        None => end,
    };
    Ok((start, end))
}

fn account_filter(args: &AccountArgs) -> AccountFilter {
    AccountFilter {
        include_closed: !args.open_only,
        account_ids: if args.accounts.is_empty() {
            None
        } else {
            Some(args.accounts.clone())
        },
    }
}

/// The account shown in detail when exactly one id is given. The id
/// still has to pass the `--open-only` filter.
fn detail_account(conn: &Connection, args: &AccountArgs) -> Result<Option<Account>> {
    let [account_id] = args.accounts.as_slice() else {
        return Ok(None);
    };
    let account = conn.account(*account_id)?;
    if !account_filter(args).accepts(&account) {
        anyhow::bail!(
            "Account '{}' is closed; drop --open-only to show it",
            account.name
        );
    }
    Ok(Some(account))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn dispatch_value(
    conn: &Connection,
    config: &EngineConfig,
    accounts: &AccountArgs,
    range: &RangeArgs,
    json: bool,
) -> Result<()> {
    let (start, end) = resolve_range(conn, range, today())?;

    // A single account gets the detailed per-asset view
    if let Some(account) = detail_account(conn, accounts)? {
        let value = reports::get_account_value(conn, config, account.id, start, end)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            let assets = db::list_assets(conn)?;
            print!("{}", formatters::format_account_table(&value, &account, &assets));
        }
        return Ok(());
    }

    let filter = account_filter(accounts);
    let value = reports::get_value_all(conn, config, &filter, start, end)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        let all = conn.accounts()?;
        print!("{}", formatters::format_portfolio_table(&value, &all));
    }
    Ok(())
}

fn dispatch_cash_flow(
    conn: &Connection,
    config: &EngineConfig,
    account_id: i64,
    range: &RangeArgs,
    json: bool,
) -> Result<()> {
    let (start, end) = resolve_range(conn, range, today())?;
    let flows = reports::get_cash_flow(conn, config, account_id, start, end)?;
    let dates = DateRange::new(start, end, config.limits.max_series_days)?.dates();

    if json {
        let payload = serde_json::json!({
            "account_id": account_id,
            "dates": dates,
            "categories": flows,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let categories = conn.categories()?;
        print!(
            "{}",
            formatters::format_cash_flow_table(&dates, &flows, &categories)
        );
    }
    Ok(())
}

fn dispatch_quantities(
    conn: &Connection,
    config: &EngineConfig,
    account_id: i64,
    range: &RangeArgs,
    json: bool,
) -> Result<()> {
    let (start, end) = resolve_range(conn, range, today())?;
    let quantities = reports::get_asset_quantity(conn, config, account_id, start, end)?;
    let dates = DateRange::new(start, end, config.limits.max_series_days)?.dates();

    if json {
        let payload = serde_json::json!({
            "account_id": account_id,
            "dates": dates,
            "assets": quantities,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let assets = db::list_assets(conn)?;
        print!(
            "{}",
            formatters::format_quantities_table(&dates, &quantities, &assets)
        );
    }
    Ok(())
}

fn dispatch_performance(
    conn: &Connection,
    config: &EngineConfig,
    accounts: &AccountArgs,
    range: &RangeArgs,
    json: bool,
) -> Result<()> {
    let (start, end) = match (&range.period, &range.from, &range.to) {
        // Performance defaults to year-to-date rather than a single day
        (None, None, None) => resolve_range(
            conn,
            &RangeArgs {
                period: Some("YTD".to_string()),
                ..RangeArgs::default()
            },
            today(),
        )?,
        _ => resolve_range(conn, range, today())?,
    };

    let report = reports::calculate_performance(conn, config, &account_filter(accounts), start, end)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", formatters::format_performance(&report));
    }
    Ok(())
}

fn target_assets(conn: &Connection, asset: Option<i64>) -> Result<Vec<Asset>> {
    match asset {
        Some(id) => Ok(vec![conn.asset(id)?]),
        None => db::list_assets(conn),
    }
}

fn dispatch_recompute(
    conn: &mut Connection,
    config: &EngineConfig,
    asset: Option<i64>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let assets = target_assets(conn, asset)?;
    let mut results = Vec::with_capacity(assets.len());

    for asset in &assets {
        let changes = recompute_splits(&*conn, config, asset.id)
            .with_context(|| format!("Failed to recompute quantities of {}", asset.label()))?;
        if !dry_run && !changes.is_empty() {
            db::apply_quantity_adjustments(conn, &changes)?;
        }
        results.push((asset, changes));
    }

    let total: usize = results.iter().map(|(_, c)| c.len()).sum();
    info!("Split recompute: {} assets, {} rows", assets.len(), total);

    if json {
        let payload: Vec<_> = results
            .iter()
            .map(|(asset, changes)| {
                serde_json::json!({
                    "asset_id": asset.id,
                    "dry_run": dry_run,
                    "adjustments": changes,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (asset, changes) in &results {
            print!("{}", formatters::format_adjustments(asset, changes, dry_run));
        }
        if dry_run && total > 0 {
            println!("\n{} Dry run - no changes saved", "ℹ".blue().bold());
        }
    }
    Ok(())
}

fn dispatch_prune(
    conn: &mut Connection,
    asset: Option<i64>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let assets = target_assets(conn, asset)?;
    let mut results = Vec::with_capacity(assets.len());

    for asset in &assets {
        let plan = prune_valuations(&*conn, asset.id)
            .with_context(|| format!("Failed to plan pruning of {}", asset.label()))?;
        if !dry_run && !plan.is_empty() {
            db::delete_valuations(conn, &plan)?;
        }
        results.push((asset, plan));
    }

    if json {
        let payload: Vec<_> = results
            .iter()
            .map(|(_, plan)| {
                serde_json::json!({
                    "asset_id": plan.asset_id,
                    "dry_run": dry_run,
                    "valuation_ids": plan.valuation_ids,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (asset, plan) in &results {
            print!("{}", formatters::format_prune(asset, plan, dry_run));
        }
    }
    Ok(())
}
