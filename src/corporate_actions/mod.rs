// Corporate actions module - Split adjustment engine

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::db::{AssetSplit, TransactionSplit};
use crate::error::LedgerError;
use crate::source::LedgerSource;
use crate::utils::floor_quantity;

/// Pending write of a split-adjusted quantity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantityAdjustment {
    pub split_id: i64,
    pub old_quantity: Option<Decimal>,
    pub new_quantity: Decimal,
}

/// Cumulative multiplier boundaries for an asset.
///
/// Entry `k` is `(date_k, m_k)`, with `m_k` the product of the multipliers
/// of split `k` and every later split. A transaction dated before `date_k`
/// and on or after `date_{k-1}` is scaled by `m_k`; transactions on or after
/// the last split date are not scaled. Compounded from the latest split to
/// the earliest.
pub fn cumulative_multipliers(
    splits: &[AssetSplit],
) -> Result<Vec<(NaiveDate, Decimal)>, LedgerError> {
    let mut sorted: Vec<&AssetSplit> = splits.iter().collect();
    sorted.sort_by_key(|s| s.date);

    for pair in sorted.windows(2) {
        if pair[0].date == pair[1].date {
            return Err(LedgerError::DuplicateSplit {
                asset_id: pair[1].asset_id,
                date: pair[1].date,
            });
        }
    }

    let mut out = Vec::with_capacity(sorted.len());
    let mut running = Decimal::ONE;
    for split in sorted.iter().rev() {
        if split.multiplier <= Decimal::ZERO {
            return Err(LedgerError::InvalidMultiplier {
                asset_id: split.asset_id,
                date: split.date,
                multiplier: split.multiplier,
            });
        }
        running *= split.multiplier;
        out.push((split.date, running));
    }
    out.reverse();
    Ok(out)
}

/// Residual tracker for one account's position in the asset
#[derive(Debug, Default)]
struct Residual {
    unadjusted: Decimal,
    adjusted: Decimal,
}

/// Compute split-adjusted quantities for every asset-linked transaction.
///
/// `transactions` must be date-ordered and belong to one asset (any number
/// of accounts). Each quantity is scaled by the compounded multiplier of
/// every split dated after the transaction and floored to `quantity_dp`
/// places. Whenever an account's running unadjusted quantity returns to
/// exactly zero, the closing transaction absorbs the accumulated rounding
/// error so the adjusted position is exactly zero too.
///
/// Returns one adjusted quantity per input transaction, in input order.
pub fn adjust_quantities(
    splits: &[AssetSplit],
    transactions: &[TransactionSplit],
    quantity_dp: u32,
) -> Result<Vec<Decimal>, LedgerError> {
    let boundaries = cumulative_multipliers(splits)?;

    let mut out = Vec::with_capacity(transactions.len());
    let mut residuals: HashMap<i64, Residual> = HashMap::new();
    let mut boundary = 0;
    let mut previous: Option<NaiveDate> = None;

    for tx in transactions {
        if let Some(prev) = previous {
            if tx.date < prev {
                return Err(LedgerError::UnsortedLedger {
                    id: tx.id,
                    date: tx.date,
                    previous: prev,
                });
            }
        }
        previous = Some(tx.date);

        let asset_id = tx.asset_id.unwrap_or_default();
        let unadjusted = tx
            .quantity_unadjusted
            .ok_or(LedgerError::MissingQuantity { id: tx.id, asset_id })?;

        // Advance past every split already effective on this date
        while boundary < boundaries.len() && tx.date >= boundaries[boundary].0 {
            boundary += 1;
        }
        let multiplier = boundaries
            .get(boundary)
            .map(|(_, m)| *m)
            .unwrap_or(Decimal::ONE);

        let mut adjusted = floor_quantity(unadjusted * multiplier, quantity_dp);

        let residual = residuals.entry(tx.account_id).or_default();
        residual.unadjusted += unadjusted;
        residual.adjusted += adjusted;
        if residual.unadjusted.is_zero() {
            adjusted -= residual.adjusted;
            *residual = Residual::default();
        }

        out.push(adjusted);
    }

    Ok(out)
}

/// Recompute an asset's adjusted quantities and return the rows that change.
///
/// Nothing is written; commit the result with
/// [`crate::db::apply_quantity_adjustments`] inside one transaction, and
/// never run two recomputations for the same asset concurrently.
pub fn recompute_splits<S: LedgerSource + ?Sized>(
    source: &S,
    config: &EngineConfig,
    asset_id: i64,
) -> Result<Vec<QuantityAdjustment>> {
    let splits = source
        .fetch_splits(asset_id)
        .with_context(|| format!("Failed to load splits for asset {}", asset_id))?;
    let transactions = source
        .fetch_asset_transaction_splits(asset_id)
        .with_context(|| format!("Failed to load transactions for asset {}", asset_id))?;

    let adjusted = adjust_quantities(&splits, &transactions, config.precision.quantity_dp)?;

    let changes: Vec<QuantityAdjustment> = transactions
        .iter()
        .zip(adjusted)
        .filter(|(tx, new_quantity)| tx.quantity != Some(*new_quantity))
        .map(|(tx, new_quantity)| QuantityAdjustment {
            split_id: tx.id,
            old_quantity: tx.quantity,
            new_quantity,
        })
        .collect();

    debug!(
        "Asset {}: {} splits, {} transactions, {} adjustments pending",
        asset_id,
        splits.len(),
        transactions.len(),
        changes.len()
    );
    if !changes.is_empty() {
        info!(
            "Recomputed split-adjusted quantities for asset {} ({} rows)",
            asset_id,
            changes.len()
        );
    }

    Ok(changes)
}
