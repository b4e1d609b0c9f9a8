//! Rounding, parsing and formatting helpers
//!
//! Money and quantities are fixed-point decimals. All rounding in the engine
//! goes through the two functions below so the rules live in one place.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round a money amount to `dp` places (banker's rounding)
pub fn round_money(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven)
}

/// Floor a quantity to `dp` places (towards negative infinity)
pub fn floor_quantity(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::ToNegativeInfinity)
}

/// Parse a YYYY-MM-DD date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

/// Format an amount with thousands separators and two decimals.
///
/// # Examples
/// ```
/// use ledgerline::utils::format_amount;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_amount(dec!(1234.567)), "1,234.57");
/// assert_eq!(format_amount(dec!(-0.5)), "-0.50");
/// ```
pub fn format_amount(value: Decimal) -> String {
    let is_negative = value < Decimal::ZERO;
    let formatted = format!("{:.2}", value.abs().round_dp(2));
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let with_separators: String = integer_part
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 {
                vec![',', c]
            } else {
                vec![c]
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let sign = if is_negative { "-" } else { "" };
    format!("{}{}.{}", sign, with_separators, decimal_part)
}

/// Format a return ratio as a percentage: 0.0525 -> "5.25%"
pub fn format_pct(ratio: Decimal) -> String {
    format!("{:.2}%", (ratio * Decimal::ONE_HUNDRED).round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_uses_bankers_rounding() {
        assert_eq!(round_money(dec!(1.125), 2), dec!(1.12));
        assert_eq!(round_money(dec!(1.135), 2), dec!(1.14));
        assert_eq!(round_money(dec!(-1.125), 2), dec!(-1.12));
    }

    #[test]
    fn test_floor_quantity_rounds_down() {
        assert_eq!(floor_quantity(dec!(3.3333339), 6), dec!(3.333333));
        assert_eq!(floor_quantity(dec!(-3.3333331), 6), dec!(-3.333334));
        assert_eq!(floor_quantity(dec!(2), 6), dec!(2));
    }

    #[test]
    fn test_format_amount_separators() {
        assert_eq!(format_amount(dec!(0)), "0.00");
        assert_eq!(format_amount(dec!(999.99)), "999.99");
        assert_eq!(format_amount(dec!(1000)), "1,000.00");
        assert_eq!(format_amount(dec!(1234567.891)), "1,234,567.89");
        assert_eq!(format_amount(dec!(-1000000)), "-1,000,000.00");
    }

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(dec!(0.0525)), "5.25%");
        assert_eq!(format_pct(dec!(-0.1)), "-10.00%");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date("29/02/2024").is_err());
    }
}
