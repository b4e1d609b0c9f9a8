// Pricing module - dense daily price series from sparse valuations

pub mod prune;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::db::AssetValuation;
use crate::error::LedgerError;
use crate::series::{self, DateRange};

/// How gaps between known valuations are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationMode {
    /// Carry the last known price until the next one (right-continuous)
    Step,
    /// Straight line between neighbouring known prices
    Linear,
}

/// Check valuations are strictly increasing by date
pub(crate) fn check_sorted(valuations: &[AssetValuation]) -> Result<(), LedgerError> {
    for pair in valuations.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(LedgerError::UnsortedValuations {
                asset_id: pair[1].asset_id,
                date: pair[1].date,
            });
        }
    }
    Ok(())
}

/// Densify an asset's valuations over `range`.
///
/// `valuations` may be any date-sorted superset of the points the range
/// needs: the latest one on or before `range.start()`, every one inside the
/// range and, for linear mode, the first one after `range.end()`.
///
/// Before the first known point the price is zero. Queried on a stored
/// date, both modes return the stored price unchanged.
pub fn interpolate(
    valuations: &[AssetValuation],
    range: &DateRange,
    mode: InterpolationMode,
) -> Result<Vec<Decimal>, LedgerError> {
    check_sorted(valuations)?;

    if valuations.is_empty() {
        debug!("No valuations available, pricing at zero");
        return Ok(series::zeros(range));
    }

    let start = range.start();
    let end = range.end();

    // Index of the seed (latest point at/before start), if any
    let first_after_start = valuations.partition_point(|v| v.date <= start);
    let seed_idx = first_after_start.checked_sub(1);
    let seed = seed_idx
        .map(|i| valuations[i].price)
        .unwrap_or(Decimal::ZERO);

    let in_range = valuations[first_after_start..]
        .iter()
        .take_while(|v| v.date <= end)
        .map(|v| (v.date, v.price));

    let mut prices = series::fill_forward(range, seed, in_range);

    if mode == InterpolationMode::Linear {
        // Anchors: the seed, every in-range point and the first point after
        // the range. Each gap between consecutive anchors is a line.
        let lo = seed_idx.unwrap_or(first_after_start);
        let hi = valuations.partition_point(|v| v.date <= end);
        let upper = (hi + 1).min(valuations.len());
        let anchors = &valuations[lo..upper];

        for pair in anchors.windows(2) {
            fill_line(&mut prices, range, &pair[0], &pair[1]);
        }
    }

    Ok(prices)
}

/// Overwrite the strictly-interior days between `a` and `b` with the line
/// through both points. Endpoint days keep their stored prices.
fn fill_line(prices: &mut [Decimal], range: &DateRange, a: &AssetValuation, b: &AssetValuation) {
    let span = Decimal::from((b.date - a.date).num_days());
    let rise = b.price - a.price;

    let from = a.date.max(range.start());
    let to = b.date.min(range.end());
    let mut day = from;
    while day <= to {
        if day > a.date && day < b.date {
            if let Some(i) = range.offset(day) {
                let run = Decimal::from((day - a.date).num_days());
                prices[i] = a.price + rise * run / span;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
}

/// Dense price series for many assets over one range.
///
/// Assets are addressed by their position in `asset_ids`; `lookup` maps a
/// database id back to that position.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    asset_ids: Vec<i64>,
    lookup: HashMap<i64, usize>,
    prices: Vec<Vec<Decimal>>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an asset's price series
    pub fn insert(&mut self, asset_id: i64, prices: Vec<Decimal>) {
        match self.lookup.get(&asset_id) {
            Some(&i) => self.prices[i] = prices,
            None => {
                self.lookup.insert(asset_id, self.asset_ids.len());
                self.asset_ids.push(asset_id);
                self.prices.push(prices);
            }
        }
    }

    pub fn get(&self, asset_id: i64) -> Option<&[Decimal]> {
        self.lookup
            .get(&asset_id)
            .map(|&i| self.prices[i].as_slice())
    }

    /// Price series for an asset, or zeros when the table has none
    pub fn get_or_zero(&self, asset_id: i64, range: &DateRange) -> Vec<Decimal> {
        match self.get(asset_id) {
            Some(p) => p.to_vec(),
            None => {
                warn!("No price series for asset {}, valuing at zero", asset_id);
                series::zeros(range)
            }
        }
    }

    pub fn asset_ids(&self) -> &[i64] {
        &self.asset_ids
    }

    pub fn len(&self) -> usize {
        self.asset_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.asset_ids.is_empty()
    }
}
