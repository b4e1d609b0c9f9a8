use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::LedgerError;
use crate::pricing::InterpolationMode;

/// Asset categories supported by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssetCategory {
    Cash,
    Security,
    RealEstate,
    Index, // Benchmarks, kept for comparison and never pruned
    Forex,
    Bond,
    Fund,
    Item,
    Other,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Cash => "CASH",
            AssetCategory::Security => "SECURITY",
            AssetCategory::RealEstate => "REAL_ESTATE",
            AssetCategory::Index => "INDEX",
            AssetCategory::Forex => "FOREX",
            AssetCategory::Bond => "BOND",
            AssetCategory::Fund => "FUND",
            AssetCategory::Item => "ITEM",
            AssetCategory::Other => "OTHER",
        }
    }
}

impl FromStr for AssetCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CASH" => Ok(AssetCategory::Cash),
            "SECURITY" | "STOCK" => Ok(AssetCategory::Security),
            "REAL_ESTATE" | "REALESTATE" => Ok(AssetCategory::RealEstate),
            "INDEX" => Ok(AssetCategory::Index),
            "FOREX" | "FX" => Ok(AssetCategory::Forex),
            "BOND" => Ok(AssetCategory::Bond),
            "FUND" => Ok(AssetCategory::Fund),
            "ITEM" => Ok(AssetCategory::Item),
            "OTHER" => Ok(AssetCategory::Other),
            _ => Err(()),
        }
    }
}

/// Asset (security, property, benchmark index, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub id: i64,
    pub name: String,
    pub category: AssetCategory,
    pub interpolate: bool,
    pub ticker: Option<String>,
}

impl Asset {
    /// Fill strategy used to densify this asset's valuations
    pub fn interpolation_mode(&self) -> InterpolationMode {
        if self.interpolate {
            InterpolationMode::Linear
        } else {
            InterpolationMode::Step
        }
    }

    /// Label for tables: ticker when known, otherwise the name
    pub fn label(&self) -> &str {
        self.ticker.as_deref().unwrap_or(&self.name)
    }
}

/// Account holding cash and assets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub currency: String,
    pub closed: bool,
}

/// How a transaction category's cash relates to the portfolio boundary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Contributions and withdrawals; moves cost basis
    External,
    /// Dividends, interest, fees; moves profit
    ProfitLoss,
    /// Trades between cash and assets inside an account
    Internal,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::External => "EXTERNAL",
            FlowKind::ProfitLoss => "PROFIT_LOSS",
            FlowKind::Internal => "INTERNAL",
        }
    }
}

impl FromStr for FlowKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EXTERNAL" => Ok(FlowKind::External),
            "PROFIT_LOSS" | "PROFITLOSS" => Ok(FlowKind::ProfitLoss),
            "INTERNAL" => Ok(FlowKind::Internal),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionCategory {
    pub id: i64,
    pub name: String,
    pub flow: FlowKind,
}

/// One leg of a transaction, booked against a single account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionSplit {
    pub id: i64,
    pub transaction_id: i64,
    pub account_id: i64,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub category_id: i64,
    pub asset_id: Option<i64>,
    pub quantity_unadjusted: Option<Decimal>, // Positive = acquired
    pub quantity: Option<Decimal>,            // Split-adjusted
}

impl TransactionSplit {
    /// Check the per-row invariants: non-zero amount, and an asset reference
    /// if and only if a quantity is present.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount.is_zero() {
            return Err(LedgerError::ZeroAmount { id: self.id });
        }
        match (self.asset_id, self.quantity_unadjusted) {
            (Some(asset_id), None) => Err(LedgerError::MissingQuantity {
                id: self.id,
                asset_id,
            }),
            (None, Some(_)) => Err(LedgerError::QuantityWithoutAsset { id: self.id }),
            _ => Ok(()),
        }
    }

    /// Split-adjusted quantity; rows not yet adjusted read the raw quantity
    pub fn adjusted_quantity(&self) -> Option<Decimal> {
        self.quantity.or(self.quantity_unadjusted)
    }
}

/// Price point for an asset on a date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetValuation {
    pub id: i64,
    pub asset_id: i64,
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Stock split effective on a date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetSplit {
    pub id: i64,
    pub asset_id: i64,
    pub date: NaiveDate,
    pub multiplier: Decimal,
}

/// Verify a ledger slice is date-ordered and every row is well formed
pub fn validate_ledger(splits: &[TransactionSplit]) -> Result<(), LedgerError> {
    let mut previous: Option<NaiveDate> = None;
    for split in splits {
        split.validate()?;
        if let Some(prev) = previous {
            if split.date < prev {
                return Err(LedgerError::UnsortedLedger {
                    id: split.id,
                    date: split.date,
                    previous: prev,
                });
            }
        }
        previous = Some(split.date);
    }
    Ok(())
}
