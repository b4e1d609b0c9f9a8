use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

use crate::config::{EngineConfig, MwrrConfig};
use crate::error::LedgerError;
use crate::reports::cashflow::{summarize_cash_flows, CashFlowSummary};
use crate::reports::portfolio::{get_value_all, AccountFilter};
use crate::source::LedgerSource;
use crate::utils::parse_date;

/// Decimal places kept on return ratios
const RATIO_DP: u32 = 6;
/// Internal precision of the chained TWRR factor
const FACTOR_DP: u32 = 12;

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_value: Decimal,
    pub end_value: Decimal,
    pub profit: Decimal,               // Absolute profit over the range
    pub time_weighted_return: Decimal, // Ratio, 0.05 = 5%
    pub money_weighted_return: Option<Decimal>, // Annualized, None when undefined
    pub cash_flows: CashFlowSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Mtd,     // Month-to-date
    Qtd,     // Quarter-to-date
    Ytd,     // Year-to-date
    OneYear, // Last 365 days
    AllTime, // Since first transaction
    Custom { from: NaiveDate, to: NaiveDate },
}

impl FromStr for Period {
    type Err = anyhow::Error;

    /// MTD, QTD, YTD, 1Y, ALL, a year (YYYY) or `from:to` (YYYY-MM-DD:YYYY-MM-DD)
    fn from_str(s: &str) -> Result<Self> {
        let period = s.trim();
        match period.to_ascii_uppercase().as_str() {
            "MTD" => return Ok(Period::Mtd),
            "QTD" => return Ok(Period::Qtd),
            "YTD" => return Ok(Period::Ytd),
            "1Y" | "ONEYEAR" => return Ok(Period::OneYear),
            "ALL" | "ALLTIME" => return Ok(Period::AllTime),
            _ => {}
        }

        // Year shorthand: YYYY -> YYYY-01-01:YYYY-12-31
        if let Ok(year) = period.parse::<i32>() {
            if (1900..=2100).contains(&year) {
                let from = NaiveDate::from_ymd_opt(year, 1, 1)
                    .ok_or_else(|| anyhow::anyhow!("Invalid year: {}", year))?;
                let to = NaiveDate::from_ymd_opt(year, 12, 31)
                    .ok_or_else(|| anyhow::anyhow!("Invalid year: {}", year))?;
                return Ok(Period::Custom { from, to });
            }
        }

        if let Some((from, to)) = period.split_once(':') {
            return Ok(Period::Custom {
                from: parse_date(from)?,
                to: parse_date(to)?,
            });
        }

        anyhow::bail!(
            "Invalid period '{}'. Use: MTD, QTD, YTD, 1Y, ALL, YYYY, or from:to (YYYY-MM-DD:YYYY-MM-DD)",
            period
        )
    }
}

/// Resolve a period to concrete dates relative to `today`.
/// `first_date` is the earliest ledger date, used by `AllTime`.
pub fn get_period_dates(
    period: Period,
    today: NaiveDate,
    first_date: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate)> {
    let (start, end) = match period {
        Period::Mtd => {
            let start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
                .ok_or_else(|| anyhow::anyhow!("Invalid current month"))?;
            (start, today)
        }
        Period::Qtd => {
            let quarter_start_month = ((today.month() - 1) / 3) * 3 + 1;
            let start = NaiveDate::from_ymd_opt(today.year(), quarter_start_month, 1)
                .ok_or_else(|| anyhow::anyhow!("Invalid quarter start"))?;
            (start, today)
        }
        Period::Ytd => {
            let start = NaiveDate::from_ymd_opt(today.year(), 1, 1)
                .ok_or_else(|| anyhow::anyhow!("Invalid year start"))?;
            (start, today)
        }
        Period::OneYear => {
            let start = today
                .checked_sub_days(chrono::Days::new(365))
                .ok_or_else(|| anyhow::anyhow!("Failed to compute one-year start"))?;
            (start, today)
        }
        // An empty ledger reduces to a single-day range
        Period::AllTime => (first_date.unwrap_or(today).min(today), today),
        Period::Custom { from, to } => {
            if from > to {
                anyhow::bail!("Custom period 'from' must be <= 'to'");
            }
            (from, to)
        }
    };

    Ok((start, end))
}

fn check_lengths(values: &[Decimal], profits: &[Decimal]) -> Result<(), LedgerError> {
    if values.len() != profits.len() {
        return Err(LedgerError::LengthMismatch {
            left: values.len(),
            right: profits.len(),
        });
    }
    Ok(())
}

/// Daily external flow implied by value and profit: `ΔV - ΔP`.
/// Day 0 has no flow.
pub fn implied_flows(values: &[Decimal], profits: &[Decimal]) -> Vec<Decimal> {
    let mut flows = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i == 0 {
            flows.push(Decimal::ZERO);
        } else {
            flows.push((values[i] - values[i - 1]) - (profits[i] - profits[i - 1]));
        }
    }
    flows
}

/// Cumulative time-weighted return for each day.
///
/// The range is cut into sub-periods at every day with a non-zero external
/// flow. A sub-period from day `i` to flow day `j` returns
/// `(V[j] - cf[j]) / V[i] - 1`, or 0 when `V[i]` is zero. Day 0 is always 0.
///
/// Example: start 100k, +50k contributed on a day worth 160k, end 165k
/// - Period 1: (160k - 50k) / 100k - 1 = 10%
/// - Period 2: 165k / 160k - 1 = 3.125%
/// - TWRR: 1.10 * 1.03125 - 1 = 13.4375%
pub fn twrr(values: &[Decimal], profits: &[Decimal]) -> Result<Vec<Decimal>, LedgerError> {
    check_lengths(values, profits)?;
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let flows = implied_flows(values, profits);
    let mut out = Vec::with_capacity(values.len());
    out.push(Decimal::ZERO);

    let mut closed_factor = Decimal::ONE;
    let mut period_start = values[0];

    for j in 1..values.len() {
        let factor = if period_start.is_zero() {
            Decimal::ONE
        } else {
            ((values[j] - flows[j]) / period_start).round_dp(FACTOR_DP)
        };
        let cumulative = (closed_factor * factor).round_dp(FACTOR_DP);
        out.push((cumulative - Decimal::ONE).round_dp(RATIO_DP));

        if !flows[j].is_zero() {
            closed_factor = cumulative;
            period_start = values[j];
        }
    }

    Ok(out)
}

/// Net present value of the position at daily rate `r`:
/// `V[0] + Σ cf[i] / (1+r)^i - V[n-1] / (1+r)^(n-1)`
fn npv(start_value: f64, flows: &[f64], end_value: f64, r: f64) -> f64 {
    let base = 1.0 + r;
    let mut total = start_value;
    for (i, cf) in flows.iter().enumerate().skip(1) {
        if *cf != 0.0 {
            total += cf / base.powi(i as i32);
        }
    }
    total - end_value / base.powi(flows.len() as i32 - 1)
}

fn daily_rate(annual: f64) -> f64 {
    (1.0 + annual).powf(1.0 / 365.0) - 1.0
}

/// Annualized money-weighted return (IRR) of a value/profit series.
///
/// Solves for the daily rate by bisection over the configured annual
/// domain, then annualizes as `(1+r)^365 - 1`. `None` when nothing moves
/// (all flows and both endpoints zero) or no root lies inside the domain.
/// A single day returns `Some(0)`.
pub fn mwrr(
    values: &[Decimal],
    profits: &[Decimal],
    config: &MwrrConfig,
) -> Result<Option<Decimal>, LedgerError> {
    check_lengths(values, profits)?;
    if values.is_empty() {
        return Ok(None);
    }
    if values.len() == 1 {
        return Ok(Some(Decimal::ZERO));
    }

    let to_f64 = |d: &Decimal| d.to_f64().unwrap_or(0.0);
    let flows: Vec<f64> = implied_flows(values, profits).iter().map(to_f64).collect();
    let start_value = to_f64(&values[0]);
    let end_value = to_f64(&values[values.len() - 1]);

    if start_value == 0.0 && end_value == 0.0 && flows.iter().all(|f| *f == 0.0) {
        debug!("MWRR undefined: no value and no flows");
        return Ok(None);
    }

    let mut lo = daily_rate(config.min_annual_rate);
    let mut hi = daily_rate(config.max_annual_rate);
    let mut f_lo = npv(start_value, &flows, end_value, lo);
    let f_hi = npv(start_value, &flows, end_value, hi);

    if !f_lo.is_finite() || !f_hi.is_finite() {
        debug!("MWRR undefined: NPV not finite at domain bounds");
        return Ok(None);
    }
    let rate = if f_lo == 0.0 {
        lo
    } else if f_hi == 0.0 {
        hi
    } else if f_lo.signum() == f_hi.signum() {
        debug!("MWRR undefined: no sign change inside the rate domain");
        return Ok(None);
    } else {
        let mut mid = (lo + hi) / 2.0;
        for _ in 0..config.max_iterations {
            mid = (lo + hi) / 2.0;
            let f_mid = npv(start_value, &flows, end_value, mid);
            if f_mid == 0.0 || (hi - lo) / 2.0 < config.tolerance {
                break;
            }
            if f_mid.signum() == f_lo.signum() {
                lo = mid;
                f_lo = f_mid;
            } else {
                hi = mid;
            }
        }
        mid
    };

    let annual = (1.0 + rate).powi(365) - 1.0;
    Ok(Decimal::from_f64(annual).map(|d| d.round_dp(RATIO_DP)))
}

/// Value, profit and return metrics of the selected accounts over a range
pub fn calculate_performance<S: LedgerSource + ?Sized>(
    source: &S,
    config: &EngineConfig,
    filter: &AccountFilter,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PerformanceReport> {
    let portfolio = get_value_all(source, config, filter, start, end)?;

    let twr = twrr(&portfolio.values, &portfolio.profits)?;
    let mwr = mwrr(&portfolio.values, &portfolio.profits, &config.mwrr)?;
    // Day 0 flows are part of the opening value
    let cash_flows = summarize_cash_flows(portfolio.external_flows.get(1..).unwrap_or(&[]));

    let start_value = portfolio.values.first().copied().unwrap_or_default();
    let end_value = portfolio.values.last().copied().unwrap_or_default();

    Ok(PerformanceReport {
        start_date: start,
        end_date: end,
        start_value,
        end_value,
        profit: portfolio.profits.last().copied().unwrap_or_default(),
        time_weighted_return: twr.last().copied().unwrap_or_default(),
        money_weighted_return: mwr,
        cash_flows,
    })
}
