#![allow(dead_code)]

use anyhow::{Context, Result};
use chrono::NaiveDate;
use ledgerline::db::{self, AssetCategory, NewSplit};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tempfile::TempDir;

pub fn db_path(home: &TempDir) -> PathBuf {
    home.path().join(".ledgerline").join("data.db")
}

pub fn open_conn(home: &TempDir) -> Result<Connection> {
    let path = db_path(home);
    Connection::open(path).context("failed to open test database")
}

/// Fresh database in a temporary directory
pub fn create_test_db() -> Result<(TempDir, Connection)> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("test.db");
    db::init_database(Some(path.clone()))?;
    let conn = db::open_db(Some(path))?;
    Ok((temp_dir, conn))
}

pub fn category(conn: &Connection, name: &str) -> Result<i64> {
    db::find_category(conn, name)?.with_context(|| format!("missing category {}", name))
}

/// Account and security ready for trades
pub struct Fixture {
    pub account_id: i64,
    pub asset_id: i64,
    pub transfers: i64,
    pub trades: i64,
    pub dividends: i64,
}

pub fn setup_fixture(conn: &Connection) -> Result<Fixture> {
    Ok(Fixture {
        account_id: db::insert_account(conn, "Brokerage", "usd")?,
        asset_id: db::insert_asset(conn, "Example Corp", AssetCategory::Security, false, Some("EXC"))?,
        transfers: category(conn, "Transfers")?,
        trades: category(conn, "Securities Traded")?,
        dividends: category(conn, "Dividends Received")?,
    })
}

pub fn deposit(conn: &mut Connection, fx: &Fixture, date: NaiveDate, amount: Decimal) -> Result<i64> {
    db::insert_transaction(
        conn,
        date,
        Some("Deposit"),
        &[NewSplit::cash(fx.account_id, fx.transfers, amount)],
    )
}

/// Trade `quantity` units (negative sells) for `amount` of cash
pub fn trade(
    conn: &mut Connection,
    fx: &Fixture,
    date: NaiveDate,
    amount: Decimal,
    quantity: Decimal,
) -> Result<i64> {
    db::insert_transaction(
        conn,
        date,
        Some("Trade"),
        &[NewSplit::trade(fx.account_id, fx.trades, amount, fx.asset_id, quantity)],
    )
}

pub fn valuation_dates(conn: &Connection, asset_id: i64) -> Result<Vec<NaiveDate>> {
    let mut stmt =
        conn.prepare("SELECT date FROM asset_valuations WHERE asset_id = ?1 ORDER BY date")?;
    let rows = stmt.query_map([asset_id], |row| row.get(0))?;
    let mut dates = Vec::new();
    for row in rows {
        dates.push(row?);
    }
    Ok(dates)
}

/// Stored adjusted quantities of an asset, in ledger order
pub fn stored_quantities(conn: &Connection, asset_id: i64) -> Result<Vec<Option<String>>> {
    let mut stmt = conn.prepare(
        "SELECT s.quantity FROM transaction_splits s
         JOIN transactions t ON t.id = s.transaction_id
         WHERE s.asset_id = ?1 ORDER BY t.date, s.id",
    )?;
    let rows = stmt.query_map([asset_id], |row| row.get(0))?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}
