use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::db::TransactionSplit;
use crate::series::{self, DateRange};
use crate::source::LedgerSource;

/// Totals of a daily external-flow series
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CashFlowSummary {
    pub total_contributions: Decimal,
    pub total_withdrawals: Decimal, // Positive amount
    pub net_flow: Decimal,
    pub flow_count: usize,
}

/// Non-cumulative daily sums per category for splits dated inside `range`.
/// Categories without any split in range are left out.
pub fn cash_flow_by_category(
    splits: &[TransactionSplit],
    range: &DateRange,
) -> BTreeMap<i64, Vec<Decimal>> {
    let mut grouped: BTreeMap<i64, Vec<(NaiveDate, Decimal)>> = BTreeMap::new();
    for split in splits.iter().filter(|s| range.contains(s.date)) {
        grouped
            .entry(split.category_id)
            .or_default()
            .push((split.date, split.amount));
    }

    grouped
        .into_iter()
        .map(|(category_id, deltas)| (category_id, series::daily_totals(range, deltas)))
        .collect()
}

/// Daily cash flow of an account by transaction category
pub fn get_cash_flow<S: LedgerSource + ?Sized>(
    source: &S,
    config: &EngineConfig,
    account_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BTreeMap<i64, Vec<Decimal>>> {
    let range = DateRange::new(start, end, config.limits.max_series_days)?;
    let account = source.account(account_id)?;
    let splits = source
        .fetch_transaction_splits(account_id, end)
        .with_context(|| format!("Failed to load ledger of account '{}'", account.name))?;
    crate::db::models::validate_ledger(&splits)?;

    Ok(cash_flow_by_category(&splits, &range))
}

/// Summarize daily external flows for reporting. Each non-zero day counts
/// as one flow.
pub fn summarize_cash_flows(flows: &[Decimal]) -> CashFlowSummary {
    let mut total_contributions = Decimal::ZERO;
    let mut total_withdrawals = Decimal::ZERO;
    let mut flow_count = 0;

    for flow in flows.iter().filter(|f| !f.is_zero()) {
        if flow.is_sign_positive() {
            total_contributions += *flow;
        } else {
            total_withdrawals -= *flow;
        }
        flow_count += 1;
    }

    CashFlowSummary {
        total_contributions,
        total_withdrawals,
        net_flow: total_contributions - total_withdrawals,
        flow_count,
    }
}
