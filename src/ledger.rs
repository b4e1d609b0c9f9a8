//! Ledger replay
//!
//! Walks an account's date-ordered transaction splits and produces dense
//! daily cash balances, per-asset quantities and external cash flows. Asset
//! ids are interned into a small arena once per replay; the per-day work
//! runs over plain vectors.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::db::models::validate_ledger;
use crate::db::{FlowKind, TransactionCategory, TransactionSplit};
use crate::error::LedgerError;
use crate::series::{self, DateRange};

/// Category id -> flow kind, resolved once per query
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    kinds: HashMap<i64, FlowKind>,
}

impl CategoryIndex {
    pub fn new(categories: &[TransactionCategory]) -> Self {
        Self {
            kinds: categories.iter().map(|c| (c.id, c.flow)).collect(),
        }
    }

    /// Flow kind of a split. Asset-linked splits are trades and always
    /// internal; unknown categories count as external.
    pub fn flow_of(&self, split: &TransactionSplit) -> FlowKind {
        if split.asset_id.is_some() {
            return FlowKind::Internal;
        }
        self.kinds
            .get(&split.category_id)
            .copied()
            .unwrap_or(FlowKind::External)
    }
}

/// Arena of asset ids seen during one query
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    ids: Vec<i64>,
    lookup: HashMap<i64, usize>,
}

impl AssetIndex {
    /// Slot for `asset_id`, allocating one on first sight
    pub fn intern(&mut self, asset_id: i64) -> usize {
        if let Some(&slot) = self.lookup.get(&asset_id) {
            return slot;
        }
        let slot = self.ids.len();
        self.ids.push(asset_id);
        self.lookup.insert(asset_id, slot);
        slot
    }

    pub fn id(&self, slot: usize) -> i64 {
        self.ids[slot]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Daily quantity of one asset held by an account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetQuantity {
    pub asset_id: i64,
    pub quantities: Vec<Decimal>,
}

/// Dense replay of one account over a date range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replay {
    pub account_id: i64,
    pub dates: Vec<NaiveDate>,
    /// End-of-day cash balance
    pub cash: Vec<Decimal>,
    /// External flows booked on each day (not cumulative)
    pub external_flows: Vec<Decimal>,
    /// Assets held on at least one day, in first-seen order
    pub assets: Vec<AssetQuantity>,
}

impl Replay {
    pub fn quantity_of(&self, asset_id: i64) -> Option<&[Decimal]> {
        self.assets
            .iter()
            .find(|a| a.asset_id == asset_id)
            .map(|a| a.quantities.as_slice())
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Sparse deltas collected for one account before densifying
#[derive(Debug, Default)]
struct ReplayBuilder {
    cash: Vec<(NaiveDate, Decimal)>,
    flows: Vec<(NaiveDate, Decimal)>,
    assets: AssetIndex,
    quantities: Vec<Vec<(NaiveDate, Decimal)>>,
}

impl ReplayBuilder {
    fn push(
        &mut self,
        split: &TransactionSplit,
        categories: &CategoryIndex,
    ) -> Result<(), LedgerError> {
        self.cash.push((split.date, split.amount));

        if categories.flow_of(split) == FlowKind::External {
            self.flows.push((split.date, split.amount));
        }

        if let Some(asset_id) = split.asset_id {
            let quantity = split
                .adjusted_quantity()
                .ok_or(LedgerError::MissingQuantity {
                    id: split.id,
                    asset_id,
                })?;
            let slot = self.assets.intern(asset_id);
            if slot == self.quantities.len() {
                self.quantities.push(Vec::new());
            }
            self.quantities[slot].push((split.date, quantity));
        }
        Ok(())
    }

    fn finish(self, account_id: i64, range: &DateRange) -> Replay {
        let cash = series::accumulate(range, Decimal::ZERO, self.cash);
        let external_flows = series::daily_totals(range, self.flows);

        let mut assets = Vec::new();
        for (slot, deltas) in self.quantities.into_iter().enumerate() {
            let quantities = series::accumulate(range, Decimal::ZERO, deltas);
            if quantities.iter().all(|q| q.is_zero()) {
                continue;
            }
            assets.push(AssetQuantity {
                asset_id: self.assets.id(slot),
                quantities,
            });
        }

        Replay {
            account_id,
            dates: range.dates(),
            cash,
            external_flows,
            assets,
        }
    }
}

/// Replay one account's splits over `range`.
///
/// Balances on the first day include every split dated on or before
/// `range.start()`; splits after `range.end()` are ignored. Assets whose
/// quantity is zero on every day are left out of `assets`.
pub fn replay_account(
    account_id: i64,
    splits: &[TransactionSplit],
    range: &DateRange,
    categories: &CategoryIndex,
) -> Result<Replay, LedgerError> {
    validate_ledger(splits)?;

    let mut builder = ReplayBuilder::default();
    for split in splits.iter().take_while(|s| s.date <= range.end()) {
        builder.push(split, categories)?;
    }
    Ok(builder.finish(account_id, range))
}

/// Replay many accounts in a single pass over a merged, date-ordered
/// ledger. Every id in `account_ids` gets a replay, even without splits;
/// splits of accounts not listed are skipped.
pub fn replay_accounts(
    account_ids: &[i64],
    splits: &[TransactionSplit],
    range: &DateRange,
    categories: &CategoryIndex,
) -> Result<BTreeMap<i64, Replay>, LedgerError> {
    validate_ledger(splits)?;

    let mut builders: BTreeMap<i64, ReplayBuilder> = account_ids
        .iter()
        .map(|&id| (id, ReplayBuilder::default()))
        .collect();

    for split in splits.iter().take_while(|s| s.date <= range.end()) {
        if let Some(builder) = builders.get_mut(&split.account_id) {
            builder.push(split, categories)?;
        }
    }

    debug!(
        "Replayed {} accounts over {} days",
        builders.len(),
        range.len()
    );

    Ok(builders
        .into_iter()
        .map(|(id, builder)| (id, builder.finish(id, range)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TRANSFERS: i64 = 1;
    const TRADES: i64 = 2;
    const DIVIDENDS: i64 = 3;

    fn categories() -> CategoryIndex {
        CategoryIndex::new(&[
            TransactionCategory {
                id: TRANSFERS,
                name: "Transfers".into(),
                flow: FlowKind::External,
            },
            TransactionCategory {
                id: TRADES,
                name: "Securities Traded".into(),
                flow: FlowKind::Internal,
            },
            TransactionCategory {
                id: DIVIDENDS,
                name: "Dividends".into(),
                flow: FlowKind::ProfitLoss,
            },
        ])
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    fn cash(id: i64, account_id: i64, day: u32, amount: Decimal, category_id: i64) -> TransactionSplit {
        TransactionSplit {
            id,
            transaction_id: id,
            account_id,
            date: d(day),
            amount,
            category_id,
            asset_id: None,
            quantity_unadjusted: None,
            quantity: None,
        }
    }

    fn trade(id: i64, day: u32, amount: Decimal, asset_id: i64, qty: Decimal) -> TransactionSplit {
        TransactionSplit {
            id,
            transaction_id: id,
            account_id: 1,
            date: d(day),
            amount,
            category_id: TRADES,
            asset_id: Some(asset_id),
            quantity_unadjusted: Some(qty),
            quantity: Some(qty),
        }
    }

    fn ledger() -> Vec<TransactionSplit> {
        vec![
            cash(1, 1, 2, dec!(100), TRANSFERS),
            trade(2, 3, dec!(-10), 7, dec!(10)),
            cash(3, 1, 5, dec!(2), DIVIDENDS),
            trade(4, 6, dec!(50), 7, dec!(-5)),
        ]
    }

    #[test]
    fn test_replay_carries_balances_forward() {
        let range = DateRange::new(d(1), d(7), 100).unwrap();
        let replay = replay_account(1, &ledger(), &range, &categories()).unwrap();

        assert_eq!(replay.len(), 7);
        assert_eq!(
            replay.cash,
            vec![
                dec!(0),
                dec!(100),
                dec!(90),
                dec!(90),
                dec!(92),
                dec!(142),
                dec!(142)
            ]
        );
        assert_eq!(
            replay.quantity_of(7).unwrap(),
            &[dec!(0), dec!(0), dec!(10), dec!(10), dec!(10), dec!(5), dec!(5)]
        );
        assert_eq!(
            replay.external_flows,
            vec![
                dec!(0),
                dec!(100),
                dec!(0),
                dec!(0),
                dec!(0),
                dec!(0),
                dec!(0)
            ]
        );
    }

    #[test]
    fn test_history_before_start_is_folded_in() {
        let range = DateRange::new(d(4), d(6), 100).unwrap();
        let replay = replay_account(1, &ledger(), &range, &categories()).unwrap();
        assert_eq!(replay.cash, vec![dec!(90), dec!(92), dec!(142)]);
        assert_eq!(replay.quantity_of(7).unwrap(), &[dec!(10), dec!(10), dec!(5)]);
        assert!(replay.external_flows.iter().all(|f| f.is_zero()));
    }

    #[test]
    fn test_single_day_matches_first_day_of_longer_range() {
        let cats = categories();
        for day in 1..=7 {
            let single =
                replay_account(1, &ledger(), &DateRange::day(d(day)), &cats).unwrap();
            let longer = replay_account(
                1,
                &ledger(),
                &DateRange::new(d(day), d(20), 100).unwrap(),
                &cats,
            )
            .unwrap();
            assert_eq!(single.cash[0], longer.cash[0]);
            assert_eq!(single.external_flows[0], longer.external_flows[0]);
            for asset in &single.assets {
                assert_eq!(
                    asset.quantities[0],
                    longer.quantity_of(asset.asset_id).unwrap()[0]
                );
            }
        }
    }

    #[test]
    fn test_assets_zero_throughout_are_dropped() {
        let mut splits = ledger();
        splits.push(trade(5, 8, dec!(-1), 9, dec!(1)));
        splits.push(trade(6, 8, dec!(1), 9, dec!(-1)));
        splits.push(trade(7, 8, dec!(-40), 7, dec!(-5)));
        let range = DateRange::new(d(8), d(9), 100).unwrap();
        let replay = replay_account(1, &splits, &range, &categories()).unwrap();

        assert!(replay.assets.is_empty());
        assert_eq!(replay.cash, vec![dec!(102), dec!(102)]);
    }

    #[test]
    fn test_unsorted_ledger_rejected() {
        let mut splits = ledger();
        splits.swap(0, 1);
        let range = DateRange::new(d(1), d(7), 100).unwrap();
        assert!(matches!(
            replay_account(1, &splits, &range, &categories()),
            Err(LedgerError::UnsortedLedger { .. })
        ));
    }

    #[test]
    fn test_batched_replay_matches_single_replays() {
        let mut merged = ledger();
        merged.insert(1, cash(10, 2, 2, dec!(40), TRANSFERS));
        merged.push(cash(11, 2, 7, dec!(-15), TRANSFERS));
        merged.push(cash(12, 3, 7, dec!(5), TRANSFERS));

        let range = DateRange::new(d(1), d(7), 100).unwrap();
        let cats = categories();
        let batched = replay_accounts(&[1, 2, 4], &merged, &range, &cats).unwrap();

        assert_eq!(batched.len(), 3);
        let own: Vec<TransactionSplit> =
            merged.iter().filter(|s| s.account_id == 1).cloned().collect();
        assert_eq!(batched[&1], replay_account(1, &own, &range, &cats).unwrap());
        assert_eq!(batched[&2].cash[6], dec!(25));
        assert_eq!(batched[&4].cash, vec![Decimal::ZERO; 7]);
    }

    #[test]
    fn test_asset_index_interns_once() {
        let mut index = AssetIndex::default();
        assert_eq!(index.intern(40), 0);
        assert_eq!(index.intern(12), 1);
        assert_eq!(index.intern(40), 0);
        assert_eq!(index.len(), 2);
        assert_eq!(index.id(1), 12);
    }
}
