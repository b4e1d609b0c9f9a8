//! Ledgerline - daily portfolio valuation from a double-entry ledger
//!
//! This library replays account transactions into dense daily series of
//! cash, holdings and value, keeps split-adjusted quantities in sync with
//! stock splits, prunes redundant valuations and computes time- and
//! money-weighted returns.

pub mod config;
pub mod corporate_actions;
pub mod db;
pub mod error;
pub mod ledger;
pub mod pricing;
pub mod reports;
pub mod series;
pub mod source;
pub mod utils;
