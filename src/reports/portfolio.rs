use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::config::EngineConfig;
use crate::db::{Account, TransactionSplit};
use crate::ledger::{replay_account, replay_accounts, CategoryIndex, Replay};
use crate::pricing::{interpolate, PriceTable};
use crate::series::{self, DateRange};
use crate::source::LedgerSource;
use crate::utils::round_money;

/// Daily value of one asset inside an account, in reporting currency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetValue {
    pub asset_id: i64,
    pub values: Vec<Decimal>,
}

/// Daily valuation of a single account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountValue {
    pub account_id: i64,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Decimal>,
    pub profits: Vec<Decimal>,
    pub cash: Vec<Decimal>,
    /// External flows of each day, converted
    pub external_flows: Vec<Decimal>,
    pub by_asset: Vec<AssetValue>,
}

/// Portfolio totals plus each included account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValue {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Decimal>,
    pub profits: Vec<Decimal>,
    pub cash: Vec<Decimal>,
    pub external_flows: Vec<Decimal>,
    pub by_account: BTreeMap<i64, AccountValue>,
}

/// Which accounts take part in a portfolio query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFilter {
    pub include_closed: bool,
    /// Restrict to these ids; `None` means every account
    pub account_ids: Option<Vec<i64>>,
}

impl Default for AccountFilter {
    fn default() -> Self {
        Self {
            include_closed: true,
            account_ids: None,
        }
    }
}

impl AccountFilter {
    pub fn open_only() -> Self {
        Self {
            include_closed: false,
            account_ids: None,
        }
    }

    pub fn accepts(&self, account: &Account) -> bool {
        if account.closed && !self.include_closed {
            return false;
        }
        match &self.account_ids {
            Some(ids) => ids.contains(&account.id),
            None => true,
        }
    }

    pub fn select(&self, accounts: Vec<Account>) -> Vec<Account> {
        accounts.into_iter().filter(|a| self.accepts(a)).collect()
    }
}

/// Value a replayed account.
///
/// Every term is converted with the day's `rate` (1 when `None`) and
/// rounded to `money_dp` before summing, so `values[i]` is exactly
/// `cash[i]` plus the asset values of day `i`.
pub fn value_account(
    replay: &Replay,
    prices: &PriceTable,
    rate: Option<&[Decimal]>,
    range: &DateRange,
    money_dp: u32,
) -> AccountValue {
    let rate_on = |i: usize| rate.and_then(|r| r.get(i).copied()).unwrap_or(Decimal::ONE);

    let cash: Vec<Decimal> = replay
        .cash
        .iter()
        .enumerate()
        .map(|(i, c)| round_money(*c * rate_on(i), money_dp))
        .collect();
    let external_flows: Vec<Decimal> = replay
        .external_flows
        .iter()
        .enumerate()
        .map(|(i, f)| round_money(*f * rate_on(i), money_dp))
        .collect();

    let mut values = cash.clone();
    let mut by_asset = Vec::with_capacity(replay.assets.len());
    for held in &replay.assets {
        let price = prices.get_or_zero(held.asset_id, range);
        let asset_values: Vec<Decimal> = held
            .quantities
            .iter()
            .zip(&price)
            .enumerate()
            .map(|(i, (q, p))| round_money(*q * *p * rate_on(i), money_dp))
            .collect();
        series::add_assign(&mut values, &asset_values);
        by_asset.push(AssetValue {
            asset_id: held.asset_id,
            values: asset_values,
        });
    }

    let profits = profit_series(&values, &external_flows);

    AccountValue {
        account_id: replay.account_id,
        dates: replay.dates.clone(),
        values,
        profits,
        cash,
        external_flows,
        by_asset,
    }
}

/// Profit measured from the first day: the basis starts at `values[0]` and
/// grows with every later external flow.
pub fn profit_series(values: &[Decimal], external_flows: &[Decimal]) -> Vec<Decimal> {
    let Some(&first) = values.first() else {
        return Vec::new();
    };
    let mut basis = first;
    values
        .iter()
        .zip(external_flows)
        .enumerate()
        .map(|(i, (v, f))| {
            if i > 0 {
                basis += *f;
            }
            *v - basis
        })
        .collect()
}

/// Sum account valuations into portfolio totals. With no accounts the
/// totals are zero series over `range`.
pub fn aggregate(range: &DateRange, accounts: Vec<AccountValue>) -> PortfolioValue {
    let mut values = series::zeros(range);
    let mut profits = series::zeros(range);
    let mut cash = series::zeros(range);
    let mut external_flows = series::zeros(range);

    let mut by_account = BTreeMap::new();
    for account in accounts {
        series::add_assign(&mut values, &account.values);
        series::add_assign(&mut profits, &account.profits);
        series::add_assign(&mut cash, &account.cash);
        series::add_assign(&mut external_flows, &account.external_flows);
        by_account.insert(account.account_id, account);
    }

    PortfolioValue {
        dates: range.dates(),
        values,
        profits,
        cash,
        external_flows,
        by_account,
    }
}

/// Interpolated price series for each asset over `range`
pub fn build_price_table<S, I>(source: &S, asset_ids: I, range: &DateRange) -> Result<PriceTable>
where
    S: LedgerSource + ?Sized,
    I: IntoIterator<Item = i64>,
{
    let mut table = PriceTable::new();
    for asset_id in asset_ids {
        let asset = source.asset(asset_id)?;
        let valuations = source
            .fetch_valuations(asset_id, range.start(), range.end())
            .with_context(|| format!("Failed to load valuations for {}", asset.label()))?;
        let prices = interpolate(&valuations, range, asset.interpolation_mode())?;
        table.insert(asset_id, prices);
    }
    Ok(table)
}

fn held_assets<'a, I>(replays: I) -> BTreeSet<i64>
where
    I: IntoIterator<Item = &'a Replay>,
{
    replays
        .into_iter()
        .flat_map(|r| r.assets.iter().map(|a| a.asset_id))
        .collect()
}

/// Daily value, profit and per-asset breakdown of one account
pub fn get_account_value<S: LedgerSource + ?Sized>(
    source: &S,
    config: &EngineConfig,
    account_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<AccountValue> {
    let range = DateRange::new(start, end, config.limits.max_series_days)?;
    let account = source.account(account_id)?;
    let categories = CategoryIndex::new(&source.categories()?);

    let splits = source
        .fetch_transaction_splits(account_id, end)
        .with_context(|| format!("Failed to load ledger of account '{}'", account.name))?;
    let replay = replay_account(account_id, &splits, &range, &categories)?;

    let prices = build_price_table(source, held_assets([&replay]), &range)?;
    let rate = source.fetch_fx_rate(&account.currency, &range)?;

    debug!(
        "Valuing account {} over {} days ({} assets)",
        account.name,
        range.len(),
        replay.assets.len()
    );

    Ok(value_account(
        &replay,
        &prices,
        rate.as_deref(),
        &range,
        config.precision.money_dp,
    ))
}

/// Portfolio totals over every account accepted by `filter`
pub fn get_value_all<S: LedgerSource + ?Sized>(
    source: &S,
    config: &EngineConfig,
    filter: &AccountFilter,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PortfolioValue> {
    let range = DateRange::new(start, end, config.limits.max_series_days)?;
    let accounts = filter.select(source.accounts()?);
    if accounts.is_empty() {
        debug!("No accounts selected, returning zero series");
        return Ok(aggregate(&range, Vec::new()));
    }
    let categories = CategoryIndex::new(&source.categories()?);

    // Merge the ledgers; the sort is stable so per-account (date, id)
    // order survives
    let mut merged: Vec<TransactionSplit> = Vec::new();
    for account in &accounts {
        let splits = source
            .fetch_transaction_splits(account.id, end)
            .with_context(|| format!("Failed to load ledger of account '{}'", account.name))?;
        merged.extend(splits);
    }
    merged.sort_by_key(|s| (s.date, s.id));

    let ids: Vec<i64> = accounts.iter().map(|a| a.id).collect();
    let replays = replay_accounts(&ids, &merged, &range, &categories)?;
    let prices = build_price_table(source, held_assets(replays.values()), &range)?;

    let mut rates: HashMap<&str, Option<Vec<Decimal>>> = HashMap::new();
    let mut valued = Vec::with_capacity(accounts.len());
    for account in &accounts {
        if !rates.contains_key(account.currency.as_str()) {
            let rate = source.fetch_fx_rate(&account.currency, &range)?;
            rates.insert(account.currency.as_str(), rate);
        }
        let rate = rates
            .get(account.currency.as_str())
            .and_then(|r| r.as_deref());
        if let Some(replay) = replays.get(&account.id) {
            valued.push(value_account(
                replay,
                &prices,
                rate,
                &range,
                config.precision.money_dp,
            ));
        }
    }

    debug!(
        "Aggregated {} accounts and {} assets over {} days",
        valued.len(),
        prices.len(),
        range.len()
    );

    Ok(aggregate(&range, valued))
}

/// Daily split-adjusted quantity of every asset an account holds in range
pub fn get_asset_quantity<S: LedgerSource + ?Sized>(
    source: &S,
    config: &EngineConfig,
    account_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BTreeMap<i64, Vec<Decimal>>> {
    let range = DateRange::new(start, end, config.limits.max_series_days)?;
    let account = source.account(account_id)?;
    let categories = CategoryIndex::new(&source.categories()?);
    let splits = source
        .fetch_transaction_splits(account_id, end)
        .with_context(|| format!("Failed to load ledger of account '{}'", account.name))?;
    let replay = replay_account(account_id, &splits, &range, &categories)?;

    Ok(replay
        .assets
        .into_iter()
        .map(|a| (a.asset_id, a.quantities))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AssetQuantity;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn replay(range: &DateRange) -> Replay {
        Replay {
            account_id: 1,
            dates: range.dates(),
            cash: vec![dec!(100), dec!(90), dec!(90), dec!(140)],
            external_flows: vec![dec!(100), dec!(0), dec!(0), dec!(0)],
            assets: vec![
                AssetQuantity {
                    asset_id: 7,
                    quantities: vec![dec!(0), dec!(10), dec!(10), dec!(5)],
                },
                AssetQuantity {
                    asset_id: 8,
                    quantities: vec![dec!(1), dec!(1), dec!(1), dec!(1)],
                },
            ],
        }
    }

    #[test]
    fn test_total_is_cash_plus_assets() {
        let range = DateRange::new(d(1), d(4), 100).unwrap();
        let mut prices = PriceTable::new();
        prices.insert(7, vec![dec!(0), dec!(0), dec!(10.333333), dec!(10)]);
        prices.insert(8, vec![dec!(2.5), dec!(2.5), dec!(2.5), dec!(3)]);
        let rate = vec![dec!(1.1), dec!(1.2), dec!(0.9), dec!(1)];

        let value = value_account(&replay(&range), &prices, Some(&rate), &range, 2);
        for i in 0..range.len() {
            let assets: Decimal = value.by_asset.iter().map(|a| a.values[i]).sum();
            assert_eq!(value.values[i], value.cash[i] + assets);
        }
        assert_eq!(value.cash[0], dec!(110.00));
        assert_eq!(value.by_asset[0].values[2], dec!(93.00));
    }

    #[test]
    fn test_profit_measured_from_range_start() {
        let range = DateRange::new(d(1), d(4), 100).unwrap();
        let mut prices = PriceTable::new();
        prices.insert(7, vec![dec!(10); 4]);
        prices.insert(8, vec![dec!(0); 4]);

        let value = value_account(&replay(&range), &prices, None, &range, 6);
        assert_eq!(value.values, vec![dec!(100), dec!(190), dec!(190), dec!(190)]);
        // The day-0 contribution is already part of the opening value
        assert_eq!(value.profits, vec![dec!(0), dec!(90), dec!(90), dec!(90)]);
    }

    #[test]
    fn test_missing_price_values_asset_at_zero() {
        let range = DateRange::new(d(1), d(4), 100).unwrap();
        let value = value_account(&replay(&range), &PriceTable::new(), None, &range, 6);
        assert_eq!(value.values, value.cash);
        assert!(value
            .by_asset
            .iter()
            .all(|a| a.values.iter().all(|v| v.is_zero())));
    }

    #[test]
    fn test_aggregate_without_accounts_is_zero() {
        let range = DateRange::new(d(1), d(3), 100).unwrap();
        let total = aggregate(&range, Vec::new());
        assert_eq!(total.values, vec![Decimal::ZERO; 3]);
        assert_eq!(total.dates.len(), 3);
        assert!(total.by_account.is_empty());
    }

    #[test]
    fn test_aggregate_sums_accounts() {
        let range = DateRange::new(d(1), d(2), 100).unwrap();
        let account = |id: i64, v: Decimal| AccountValue {
            account_id: id,
            dates: range.dates(),
            values: vec![v, v],
            profits: vec![dec!(0), v],
            cash: vec![v, v],
            external_flows: vec![dec!(0), dec!(0)],
            by_asset: Vec::new(),
        };
        let total = aggregate(&range, vec![account(1, dec!(5)), account(2, dec!(7))]);
        assert_eq!(total.values, vec![dec!(12), dec!(12)]);
        assert_eq!(total.profits, vec![dec!(0), dec!(12)]);
        assert_eq!(total.by_account.len(), 2);
    }

    #[test]
    fn test_account_filter() {
        let account = |id: i64, closed: bool| Account {
            id,
            name: format!("Account {}", id),
            currency: "USD".into(),
            closed,
        };
        let all = vec![account(1, false), account(2, true), account(3, false)];

        assert_eq!(AccountFilter::default().select(all.clone()).len(), 3);
        assert_eq!(AccountFilter::open_only().select(all.clone()).len(), 2);
        let picked = AccountFilter {
            include_closed: false,
            account_ids: Some(vec![2, 3]),
        }
        .select(all);
        assert_eq!(picked.iter().map(|a| a.id).collect::<Vec<_>>(), vec![3]);
    }
}
