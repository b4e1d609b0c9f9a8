// Valuation pruning - drop price points inside zero-holding windows

use anyhow::{Context, Result};
use chrono::NaiveDate;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use super::check_sorted;
use crate::db::models::validate_ledger;
use crate::db::{Asset, AssetCategory, AssetValuation, TransactionSplit};
use crate::error::LedgerError;
use crate::source::LedgerSource;

/// Valuations that can be deleted without changing any derived value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrunePlan {
    pub asset_id: i64,
    pub valuation_ids: Vec<i64>,
}

impl PrunePlan {
    pub fn is_empty(&self) -> bool {
        self.valuation_ids.is_empty()
    }
}

/// Span where no account holds the asset at end of day.
///
/// `from` is the day the position closed (`None` before the first
/// acquisition); `until` is the day it reopened (`None` if it never does).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ZeroWindow {
    from: Option<NaiveDate>,
    until: Option<NaiveDate>,
}

impl ZeroWindow {
    fn covers(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|f| date >= f) && self.until.is_none_or(|u| date <= u)
    }
}

/// Maximal windows where no account holds the asset at end of day.
///
/// Positions are tracked per account, so a long in one account and an
/// offsetting short in another still count as held.
fn zero_windows(transactions: &[TransactionSplit]) -> Vec<ZeroWindow> {
    let mut windows = Vec::new();
    let mut positions: HashMap<i64, Decimal> = HashMap::new();
    let mut closed_on: Option<NaiveDate> = None;
    let mut open = false;

    for (date, day) in &transactions.iter().chunk_by(|t| t.date) {
        for t in day {
            if let Some(quantity) = t.adjusted_quantity() {
                *positions.entry(t.account_id).or_default() += quantity;
            }
        }
        let held = positions.values().any(|q| !q.is_zero());

        if held && !open {
            windows.push(ZeroWindow {
                from: closed_on,
                until: Some(date),
            });
            open = true;
        } else if !held && open {
            closed_on = Some(date);
            open = false;
        }
    }

    if !open {
        windows.push(ZeroWindow {
            from: closed_on,
            until: None,
        });
    }
    windows
}

/// Decide which valuations of `asset` are redundant.
///
/// A zero window is a span where no single account holds the asset;
/// offsetting positions in different accounts still count as held.
/// Inside each zero window only the valuations bounding it survive: the
/// earliest one on or after the closing day and the latest one on or before
/// the reopening day. A window with neither bound (an asset never held)
/// keeps nothing. Index assets are never pruned.
pub fn plan_prune(
    asset: &Asset,
    transactions: &[TransactionSplit],
    valuations: &[AssetValuation],
) -> Result<PrunePlan, LedgerError> {
    validate_ledger(transactions)?;
    check_sorted(valuations)?;

    let mut plan = PrunePlan {
        asset_id: asset.id,
        valuation_ids: Vec::new(),
    };
    if asset.category == AssetCategory::Index {
        return Ok(plan);
    }

    for window in zero_windows(transactions) {
        let candidates: Vec<&AssetValuation> = valuations
            .iter()
            .filter(|v| window.covers(v.date))
            .collect();
        let Some((first, last)) = candidates.first().zip(candidates.last()) else {
            continue;
        };

        let keep_first = window.from.is_some();
        let keep_last = window.until.is_some();
        for v in &candidates {
            let bound = (keep_first && v.id == first.id) || (keep_last && v.id == last.id);
            if !bound {
                plan.valuation_ids.push(v.id);
            }
        }
    }

    plan.valuation_ids.sort_unstable();
    Ok(plan)
}

/// Build the prune plan for one asset from stored data. Nothing is deleted;
/// commit with [`crate::db::delete_valuations`].
pub fn prune_valuations<S: LedgerSource + ?Sized>(source: &S, asset_id: i64) -> Result<PrunePlan> {
    let asset = source.asset(asset_id)?;
    let transactions = source
        .fetch_asset_transaction_splits(asset_id)
        .with_context(|| format!("Failed to load transactions for asset {}", asset_id))?;
    let valuations = source
        .fetch_all_valuations(asset_id)
        .with_context(|| format!("Failed to load valuations for asset {}", asset_id))?;

    let plan = plan_prune(&asset, &transactions, &valuations)?;

    debug!(
        "Asset {}: {} valuations, {} transactions",
        asset_id,
        valuations.len(),
        transactions.len()
    );
    if !plan.is_empty() {
        info!(
            "{} of {} valuations of {} are redundant",
            plan.valuation_ids.len(),
            valuations.len(),
            asset.label()
        );
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn asset(category: AssetCategory) -> Asset {
        Asset {
            id: 1,
            name: "Example Corp".into(),
            category,
            interpolate: false,
            ticker: None,
        }
    }

    fn trade(id: i64, account_id: i64, day: u32, qty: Decimal) -> TransactionSplit {
        TransactionSplit {
            id,
            transaction_id: id,
            account_id,
            date: d(day),
            amount: -qty * dec!(10),
            category_id: 1,
            asset_id: Some(1),
            quantity_unadjusted: Some(qty),
            quantity: Some(qty),
        }
    }

    /// One valuation per listed day; the id is the day number
    fn valuations(days: &[u32]) -> Vec<AssetValuation> {
        days.iter()
            .map(|&day| AssetValuation {
                id: day as i64,
                asset_id: 1,
                date: d(day),
                price: dec!(10),
            })
            .collect()
    }

    fn surviving(vals: &[AssetValuation], plan: &PrunePlan) -> Vec<AssetValuation> {
        vals.iter()
            .filter(|v| !plan.valuation_ids.contains(&v.id))
            .cloned()
            .collect()
    }

    #[test]
    fn test_interior_window_keeps_both_bounds() {
        // Held 5..10, flat 10..20, held again from 20
        let txs = vec![
            trade(1, 1, 5, dec!(10)),
            trade(2, 1, 10, dec!(-10)),
            trade(3, 1, 20, dec!(4)),
        ];
        let vals = valuations(&[5, 8, 11, 14, 17, 19, 22]);
        let plan = plan_prune(&asset(AssetCategory::Security), &txs, &vals).unwrap();
        // 11 is the first point after the close, 19 the last before reopening
        assert_eq!(plan.valuation_ids, vec![14, 17]);
    }

    #[test]
    fn test_leading_and_trailing_windows() {
        let txs = vec![trade(1, 1, 10, dec!(3)), trade(2, 1, 20, dec!(-3))];
        let vals = valuations(&[1, 4, 9, 12, 20, 23, 27]);
        let plan = plan_prune(&asset(AssetCategory::Security), &txs, &vals).unwrap();
        assert_eq!(plan.valuation_ids, vec![1, 4, 23, 27]);
    }

    #[test]
    fn test_pruning_is_idempotent() {
        let txs = vec![
            trade(1, 1, 5, dec!(10)),
            trade(2, 1, 10, dec!(-10)),
            trade(3, 1, 20, dec!(4)),
            trade(4, 1, 25, dec!(-4)),
        ];
        let vals = valuations(&[1, 2, 5, 11, 12, 13, 20, 26, 28, 30]);
        let a = asset(AssetCategory::Security);

        let first = plan_prune(&a, &txs, &vals).unwrap();
        assert!(!first.is_empty());
        let remaining = surviving(&vals, &first);
        let second = plan_prune(&a, &txs, &remaining).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_any_account_holding_blocks_window() {
        // Account 1 sells out while account 2 still holds; only the tail
        // after account 2 sells is a zero window
        let txs = vec![
            trade(1, 1, 2, dec!(5)),
            trade(2, 2, 3, dec!(1)),
            trade(3, 1, 6, dec!(-5)),
            trade(4, 2, 12, dec!(-1)),
        ];
        let vals = valuations(&[2, 4, 7, 9, 12, 15]);
        let plan = plan_prune(&asset(AssetCategory::Security), &txs, &vals).unwrap();
        assert_eq!(plan.valuation_ids, vec![15]);
    }

    #[test]
    fn test_offsetting_accounts_still_hold() {
        // Long in account 1, short in account 2: the total is zero but
        // both positions need prices until they close on day 10
        let txs = vec![
            trade(1, 1, 2, dec!(5)),
            trade(2, 2, 2, dec!(-5)),
            trade(3, 1, 10, dec!(-5)),
            trade(4, 2, 10, dec!(5)),
        ];
        let vals = valuations(&[1, 4, 7, 10, 13, 16]);
        let plan = plan_prune(&asset(AssetCategory::Security), &txs, &vals).unwrap();
        assert_eq!(plan.valuation_ids, vec![13, 16]);
    }

    #[test]
    fn test_same_day_round_trip_is_not_a_holding() {
        let txs = vec![trade(1, 1, 8, dec!(2)), trade(2, 1, 8, dec!(-2))];
        let vals = valuations(&[3, 8, 12]);
        let plan = plan_prune(&asset(AssetCategory::Security), &txs, &vals).unwrap();
        assert_eq!(plan.valuation_ids, vec![3, 8, 12]);
    }

    #[test]
    fn test_no_transactions_prunes_everything() {
        let vals = valuations(&[1, 2, 3]);
        let plan = plan_prune(&asset(AssetCategory::Security), &[], &vals).unwrap();
        assert_eq!(plan.valuation_ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_index_assets_are_exempt() {
        let vals = valuations(&[1, 2, 3]);
        let plan = plan_prune(&asset(AssetCategory::Index), &[], &vals).unwrap();
        assert!(plan.is_empty());
    }
}
