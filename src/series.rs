//! Dense daily series primitives
//!
//! Every derived series in the engine holds exactly one value per calendar
//! day of an inclusive `[start, end]` range. The combinators here turn
//! sparse, date-sorted event lists into those dense arrays.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::LedgerError;

/// Validated inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `start > end` and ranges longer than
    /// `max_days` days.
    pub fn new(start: NaiveDate, end: NaiveDate, max_days: i64) -> Result<Self, LedgerError> {
        if start > end {
            return Err(LedgerError::InvalidRange { start, end });
        }
        let days = (end - start).num_days() + 1;
        if days > max_days {
            return Err(LedgerError::RangeTooLong {
                days,
                max: max_days,
            });
        }
        Ok(Self { start, end })
    }

    /// Single-day range
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days, inclusive of both ends
    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Never true; a range always holds at least one day
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Index of `date` within the range
    pub fn offset(&self, date: NaiveDate) -> Option<usize> {
        if self.contains(date) {
            Some((date - self.start).num_days() as usize)
        } else {
            None
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.start
            .iter_days()
            .take(self.len())
            .collect()
    }

    /// Date at a given offset
    pub fn date_at(&self, offset: usize) -> NaiveDate {
        self.start + Days::new(offset as u64)
    }
}

/// Dense series of zeros covering the range
pub fn zeros(range: &DateRange) -> Vec<Decimal> {
    vec![Decimal::ZERO; range.len()]
}

/// Forward-fill sparse `(date, value)` events over the range.
///
/// Each day takes the value of the latest event dated on or before it.
/// Events dated before `start` replace the seed; events after `end` are
/// ignored. Events must be date-sorted.
pub fn fill_forward<T, I>(range: &DateRange, seed: T, events: I) -> Vec<T>
where
    T: Clone,
    I: IntoIterator<Item = (NaiveDate, T)>,
{
    let mut out = Vec::with_capacity(range.len());
    let mut current = seed;
    let mut events = events.into_iter().peekable();

    for offset in 0..range.len() {
        let day = range.date_at(offset);
        while let Some((date, _)) = events.peek() {
            if *date > day {
                break;
            }
            if let Some((_, value)) = events.next() {
                current = value;
            }
        }
        out.push(current.clone());
    }
    out
}

/// Running sum of sparse deltas.
///
/// Deltas dated on or before `start` fold into day 0, deltas after `end` are
/// dropped. Order of the input does not matter.
pub fn accumulate<I>(range: &DateRange, seed: Decimal, deltas: I) -> Vec<Decimal>
where
    I: IntoIterator<Item = (NaiveDate, Decimal)>,
{
    let mut out = zeros(range);
    out[0] = seed;
    for (date, delta) in deltas {
        if date <= range.start {
            out[0] += delta;
        } else if let Some(i) = range.offset(date) {
            out[i] += delta;
        }
    }
    for i in 1..out.len() {
        let prev = out[i - 1];
        out[i] += prev;
    }
    out
}

/// Non-cumulative per-day sums of the deltas dated inside the range
pub fn daily_totals<I>(range: &DateRange, deltas: I) -> Vec<Decimal>
where
    I: IntoIterator<Item = (NaiveDate, Decimal)>,
{
    let mut out = zeros(range);
    for (date, delta) in deltas {
        if let Some(i) = range.offset(date) {
            out[i] += delta;
        }
    }
    out
}

/// Elementwise sum of `other` into `acc`
pub fn add_assign(acc: &mut [Decimal], other: &[Decimal]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a += *b;
    }
}
