//! Persistence contract consumed by the engine
//!
//! The engine never talks to storage directly. Everything it needs is read
//! through `LedgerSource`; `db` provides the SQLite implementation. Every
//! ordered result must be sorted by `(date, id)` so same-day rows replay in
//! a stable order.

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::db::{Account, Asset, AssetSplit, AssetValuation, TransactionCategory, TransactionSplit};
use crate::series::DateRange;

pub trait LedgerSource {
    fn account(&self, account_id: i64) -> Result<Account>;

    fn accounts(&self) -> Result<Vec<Account>>;

    fn asset(&self, asset_id: i64) -> Result<Asset>;

    fn categories(&self) -> Result<Vec<TransactionCategory>>;

    /// Date of the earliest split in the ledger, if any
    fn first_transaction_date(&self) -> Result<Option<NaiveDate>>;

    /// Every split of an account dated on or before `through`
    fn fetch_transaction_splits(
        &self,
        account_id: i64,
        through: NaiveDate,
    ) -> Result<Vec<TransactionSplit>>;

    /// Every asset-linked split of an asset, across all accounts
    fn fetch_asset_transaction_splits(&self, asset_id: i64) -> Result<Vec<TransactionSplit>>;

    /// The latest valuation on or before `start`, every valuation inside
    /// `[start, end]`, and the first valuation after `end`
    fn fetch_valuations(
        &self,
        asset_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AssetValuation>>;

    fn fetch_all_valuations(&self, asset_id: i64) -> Result<Vec<AssetValuation>>;

    fn fetch_splits(&self, asset_id: i64) -> Result<Vec<AssetSplit>>;

    /// Dense conversion rates from `currency` into the reporting currency,
    /// one per day of `range`; `None` when no conversion applies
    fn fetch_fx_rate(&self, currency: &str, range: &DateRange) -> Result<Option<Vec<Decimal>>>;
}
