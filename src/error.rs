//! Error handling for the valuation engine
//!
//! Input contract violations are typed (`LedgerError`) and rejected before
//! any computation starts. The persistence adapter, configuration and CLI
//! layers use the anyhow-based `Result` alias for context chaining.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Contract violations detected by the core engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("date range of {days} days exceeds the limit of {max} days")]
    RangeTooLong { days: i64, max: i64 },

    #[error("ledger is not date-ordered: split {id} on {date} follows {previous}")]
    UnsortedLedger {
        id: i64,
        date: NaiveDate,
        previous: NaiveDate,
    },

    #[error("valuations for asset {asset_id} are not strictly date-ordered at {date}")]
    UnsortedValuations { asset_id: i64, date: NaiveDate },

    #[error("split {id} references asset {asset_id} but has no quantity")]
    MissingQuantity { id: i64, asset_id: i64 },

    #[error("split {id} carries a quantity but no asset")]
    QuantityWithoutAsset { id: i64 },

    #[error("split {id} has a zero amount")]
    ZeroAmount { id: i64 },

    #[error("asset {asset_id} split on {date} has non-positive multiplier {multiplier}")]
    InvalidMultiplier {
        asset_id: i64,
        date: NaiveDate,
        multiplier: Decimal,
    },

    #[error("asset {asset_id} has more than one split on {date}")]
    DuplicateSplit { asset_id: i64, date: NaiveDate },

    #[error("series length mismatch: {left} values vs {right} values")]
    LengthMismatch { left: usize, right: usize },
}

/// Result type alias for the application layers
pub type Result<T> = anyhow::Result<T>;
