// Database module - SQLite connection, models and the ledger source adapter

pub mod models;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::data_dir;
use crate::corporate_actions::QuantityAdjustment;
use crate::pricing::prune::PrunePlan;
use crate::series::{self, DateRange};
use crate::source::LedgerSource;
pub use models::{
    Account, Asset, AssetCategory, AssetSplit, AssetValuation, FlowKind, TransactionCategory,
    TransactionSplit,
};

/// Get the default database path (~/.ledgerline/data.db)
pub fn get_default_db_path() -> Result<PathBuf> {
    let dir = data_dir()?;

    // Create directory if it doesn't exist
    std::fs::create_dir_all(&dir).context("Failed to create .ledgerline directory")?;

    Ok(dir.join("data.db"))
}

/// Open database connection
pub fn open_db(db_path: Option<PathBuf>) -> Result<Connection> {
    let path = match db_path {
        Some(p) => p,
        None => get_default_db_path()?,
    };
    let conn = Connection::open(&path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;

    // Enable foreign keys
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("Failed to enable foreign keys")?;

    Ok(conn)
}

/// Initialize the database with schema
///
/// Creates the database file, all tables and indexes, and the default
/// transaction categories. Safe to run on an existing database.
pub fn init_database(db_path: Option<PathBuf>) -> Result<()> {
    let path = match db_path {
        Some(p) => p,
        None => get_default_db_path()?,
    };

    info!("Initializing database at: {:?}", path);

    let conn = open_db(Some(path))?;
    conn.execute_batch(include_str!("schema.sql"))
        .context("Failed to execute schema")?;

    info!("Database initialized successfully");
    Ok(())
}

/// Insert account, returns account_id
pub fn insert_account(conn: &Connection, name: &str, currency: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO accounts (name, currency) VALUES (?1, ?2)",
        params![name, currency.to_ascii_uppercase()],
    )
    .with_context(|| format!("Failed to insert account '{}'", name))?;

    Ok(conn.last_insert_rowid())
}

pub fn set_account_closed(conn: &Connection, account_id: i64, closed: bool) -> Result<()> {
    let updated = conn.execute(
        "UPDATE accounts SET closed = ?1 WHERE id = ?2",
        params![closed, account_id],
    )?;
    if updated == 0 {
        anyhow::bail!("Account {} not found", account_id);
    }
    Ok(())
}

/// Insert asset, returns asset_id
pub fn insert_asset(
    conn: &Connection,
    name: &str,
    category: AssetCategory,
    interpolate: bool,
    ticker: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO assets (name, category, interpolate, ticker) VALUES (?1, ?2, ?3, ?4)",
        params![name, category.as_str(), interpolate, ticker],
    )
    .with_context(|| format!("Failed to insert asset '{}'", name))?;

    Ok(conn.last_insert_rowid())
}

/// Insert transaction category, returns category_id
pub fn insert_category(conn: &Connection, name: &str, flow: FlowKind) -> Result<i64> {
    conn.execute(
        "INSERT INTO transaction_categories (name, flow) VALUES (?1, ?2)",
        params![name, flow.as_str()],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn find_category(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM transaction_categories WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// One leg of a transaction about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewSplit {
    pub account_id: i64,
    pub category_id: i64,
    pub amount: Decimal,
    pub asset_id: Option<i64>,
    pub quantity: Option<Decimal>, // Unadjusted; positive = acquired
}

impl NewSplit {
    pub fn cash(account_id: i64, category_id: i64, amount: Decimal) -> Self {
        Self {
            account_id,
            category_id,
            amount,
            asset_id: None,
            quantity: None,
        }
    }

    pub fn trade(
        account_id: i64,
        category_id: i64,
        amount: Decimal,
        asset_id: i64,
        quantity: Decimal,
    ) -> Self {
        Self {
            account_id,
            category_id,
            amount,
            asset_id: Some(asset_id),
            quantity: Some(quantity),
        }
    }
}

/// Insert a transaction with its splits in one SQLite transaction.
///
/// Adjusted quantities start out empty and read as the unadjusted ones
/// until split adjustment runs for the asset.
pub fn insert_transaction(
    conn: &mut Connection,
    date: NaiveDate,
    description: Option<&str>,
    splits: &[NewSplit],
) -> Result<i64> {
    for split in splits {
        if split.amount.is_zero() {
            anyhow::bail!("Transaction on {} has a zero-amount split", date);
        }
        if split.asset_id.is_some() != split.quantity.is_some() {
            anyhow::bail!(
                "Transaction on {}: asset and quantity must be given together",
                date
            );
        }
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO transactions (date, description) VALUES (?1, ?2)",
        params![date, description],
    )?;
    let transaction_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO transaction_splits
                (transaction_id, account_id, category_id, amount, asset_id, quantity_unadjusted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for split in splits {
            stmt.execute(params![
                transaction_id,
                split.account_id,
                split.category_id,
                split.amount.to_string(),
                split.asset_id,
                split.quantity.map(|q| q.to_string()),
            ])?;
        }
    }

    tx.commit()?;
    Ok(transaction_id)
}

/// Insert or replace the valuation of an asset on a date
pub fn upsert_valuation(
    conn: &Connection,
    asset_id: i64,
    date: NaiveDate,
    price: Decimal,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO asset_valuations (asset_id, date, price) VALUES (?1, ?2, ?3)
         ON CONFLICT(asset_id, date) DO UPDATE SET price = excluded.price",
        params![asset_id, date, price.to_string()],
    )?;

    let id = conn.query_row(
        "SELECT id FROM asset_valuations WHERE asset_id = ?1 AND date = ?2",
        params![asset_id, date],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Record a stock split. Quantities are not touched; run split
/// recomputation for the asset afterwards.
pub fn insert_asset_split(
    conn: &Connection,
    asset_id: i64,
    date: NaiveDate,
    multiplier: Decimal,
) -> Result<i64> {
    if multiplier <= Decimal::ZERO {
        anyhow::bail!("Split multiplier must be positive, got {}", multiplier);
    }
    conn.execute(
        "INSERT INTO asset_splits (asset_id, date, multiplier) VALUES (?1, ?2, ?3)",
        params![asset_id, date, multiplier.to_string()],
    )
    .with_context(|| format!("Failed to insert split for asset {} on {}", asset_id, date))?;

    Ok(conn.last_insert_rowid())
}

pub fn upsert_fx_rate(conn: &Connection, currency: &str, date: NaiveDate, rate: Decimal) -> Result<()> {
    conn.execute(
        "INSERT INTO fx_rates (currency, date, rate) VALUES (?1, ?2, ?3)
         ON CONFLICT(currency, date) DO UPDATE SET rate = excluded.rate",
        params![currency.to_ascii_uppercase(), date, rate.to_string()],
    )?;
    Ok(())
}

/// Get all assets
pub fn list_assets(conn: &Connection) -> Result<Vec<Asset>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, interpolate, ticker FROM assets ORDER BY id",
    )?;

    let assets = stmt
        .query_map([], asset_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(assets)
}

/// Helper to read Decimal from SQLite (stored as TEXT, tolerates numbers)
pub fn get_decimal_value(row: &rusqlite::Row, idx: usize) -> Result<Decimal, rusqlite::Error> {
    use rusqlite::types::{Type, ValueRef};

    match row.get_ref(idx)? {
        ValueRef::Text(bytes) => {
            let s = std::str::from_utf8(bytes).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })?;
            Decimal::from_str(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::try_from(f).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Real, Box::new(e))
        }),
        _ => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "decimal".to_string(),
            Type::Null,
        )),
    }
}

/// Helper to read optional Decimal from SQLite
fn get_optional_decimal_value(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<Option<Decimal>, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        _ => get_decimal_value(row, idx).map(Some),
    }
}

fn parse_column<T: FromStr>(row: &rusqlite::Row, idx: usize) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, raw.clone(), rusqlite::types::Type::Text)
    })
}

fn asset_from_row(row: &rusqlite::Row) -> Result<Asset, rusqlite::Error> {
    Ok(Asset {
        id: row.get(0)?,
        name: row.get(1)?,
        category: parse_column(row, 2)?,
        interpolate: row.get(3)?,
        ticker: row.get(4)?,
    })
}

fn account_from_row(row: &rusqlite::Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        currency: row.get(2)?,
        closed: row.get(3)?,
    })
}

const SPLIT_COLUMNS: &str = "s.id, s.transaction_id, s.account_id, t.date, s.amount, s.category_id,
     s.asset_id, s.quantity_unadjusted, s.quantity
     FROM transaction_splits s
     JOIN transactions t ON t.id = s.transaction_id";

fn split_from_row(row: &rusqlite::Row) -> Result<TransactionSplit, rusqlite::Error> {
    Ok(TransactionSplit {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        account_id: row.get(2)?,
        date: row.get(3)?,
        amount: get_decimal_value(row, 4)?,
        category_id: row.get(5)?,
        asset_id: row.get(6)?,
        quantity_unadjusted: get_optional_decimal_value(row, 7)?,
        quantity: get_optional_decimal_value(row, 8)?,
    })
}

fn valuation_from_row(row: &rusqlite::Row) -> Result<AssetValuation, rusqlite::Error> {
    Ok(AssetValuation {
        id: row.get(0)?,
        asset_id: row.get(1)?,
        date: row.get(2)?,
        price: get_decimal_value(row, 3)?,
    })
}

impl LedgerSource for Connection {
    fn account(&self, account_id: i64) -> Result<Account> {
        self.query_row(
            "SELECT id, name, currency, closed FROM accounts WHERE id = ?1",
            [account_id],
            account_from_row,
        )
        .optional()?
        .with_context(|| format!("Account {} not found", account_id))
    }

    fn accounts(&self) -> Result<Vec<Account>> {
        let mut stmt = self.prepare("SELECT id, name, currency, closed FROM accounts ORDER BY id")?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn asset(&self, asset_id: i64) -> Result<Asset> {
        self.query_row(
            "SELECT id, name, category, interpolate, ticker FROM assets WHERE id = ?1",
            [asset_id],
            asset_from_row,
        )
        .optional()?
        .with_context(|| format!("Asset {} not found", asset_id))
    }

    fn categories(&self) -> Result<Vec<TransactionCategory>> {
        let mut stmt =
            self.prepare("SELECT id, name, flow FROM transaction_categories ORDER BY id")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(TransactionCategory {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    flow: parse_column(row, 2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn first_transaction_date(&self) -> Result<Option<NaiveDate>> {
        // MIN() returns a single row with NULL when the table is empty
        let result: Option<Option<NaiveDate>> = self
            .query_row("SELECT MIN(date) FROM transactions", [], |row| row.get(0))
            .optional()?;
        Ok(result.flatten())
    }

    fn fetch_transaction_splits(
        &self,
        account_id: i64,
        through: NaiveDate,
    ) -> Result<Vec<TransactionSplit>> {
        let sql = format!(
            "SELECT {} WHERE s.account_id = ?1 AND t.date <= ?2 ORDER BY t.date, s.id",
            SPLIT_COLUMNS
        );
        let mut stmt = self.prepare(&sql)?;
        let splits = stmt
            .query_map(params![account_id, through], split_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(splits)
    }

    fn fetch_asset_transaction_splits(&self, asset_id: i64) -> Result<Vec<TransactionSplit>> {
        let sql = format!(
            "SELECT {} WHERE s.asset_id = ?1 ORDER BY t.date, s.id",
            SPLIT_COLUMNS
        );
        let mut stmt = self.prepare(&sql)?;
        let splits = stmt
            .query_map([asset_id], split_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(splits)
    }

    fn fetch_valuations(
        &self,
        asset_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AssetValuation>> {
        let mut stmt = self.prepare(
            "SELECT id, asset_id, date, price FROM asset_valuations
             WHERE asset_id = ?1
               AND date >= COALESCE(
                   (SELECT MAX(date) FROM asset_valuations WHERE asset_id = ?1 AND date <= ?2), ?2)
               AND date <= COALESCE(
                   (SELECT MIN(date) FROM asset_valuations WHERE asset_id = ?1 AND date > ?3), ?3)
             ORDER BY date",
        )?;
        let valuations = stmt
            .query_map(params![asset_id, start, end], valuation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(valuations)
    }

    fn fetch_all_valuations(&self, asset_id: i64) -> Result<Vec<AssetValuation>> {
        let mut stmt = self.prepare(
            "SELECT id, asset_id, date, price FROM asset_valuations
             WHERE asset_id = ?1 ORDER BY date",
        )?;
        let valuations = stmt
            .query_map([asset_id], valuation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(valuations)
    }

    fn fetch_splits(&self, asset_id: i64) -> Result<Vec<AssetSplit>> {
        let mut stmt = self.prepare(
            "SELECT id, asset_id, date, multiplier FROM asset_splits
             WHERE asset_id = ?1 ORDER BY date",
        )?;
        let splits = stmt
            .query_map([asset_id], |row| {
                Ok(AssetSplit {
                    id: row.get(0)?,
                    asset_id: row.get(1)?,
                    date: row.get(2)?,
                    multiplier: get_decimal_value(row, 3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(splits)
    }

    /// Step-filled rates; before the first stored rate the earliest one
    /// applies, even when it is dated after the range. A currency without
    /// any stored rate needs no conversion.
    fn fetch_fx_rate(&self, currency: &str, range: &DateRange) -> Result<Option<Vec<Decimal>>> {
        let currency = currency.to_ascii_uppercase();

        // Latest rate on or before the start, else the earliest one stored
        let seed: Option<Decimal> = self
            .query_row(
                "SELECT rate FROM fx_rates
                 WHERE currency = ?1
                 ORDER BY (date <= ?2) DESC,
                          CASE WHEN date <= ?2 THEN date END DESC,
                          date ASC
                 LIMIT 1",
                params![currency, range.start()],
                |row| get_decimal_value(row, 0),
            )
            .optional()?;
        let Some(seed) = seed else {
            debug!("No FX rates for {}, treating as reporting currency", currency);
            return Ok(None);
        };

        let mut stmt = self.prepare(
            "SELECT date, rate FROM fx_rates
             WHERE currency = ?1 AND date > ?2 AND date <= ?3
             ORDER BY date",
        )?;
        let rates = stmt
            .query_map(params![currency, range.start(), range.end()], |row| {
                Ok((row.get::<_, NaiveDate>(0)?, get_decimal_value(row, 1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(series::fill_forward(range, seed, rates)))
    }
}

/// Commit split-adjusted quantities in a single transaction
pub fn apply_quantity_adjustments(
    conn: &mut Connection,
    adjustments: &[QuantityAdjustment],
) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut updated = 0;

    {
        let mut stmt = tx.prepare("UPDATE transaction_splits SET quantity = ?1 WHERE id = ?2")?;
        for adj in adjustments {
            updated += stmt.execute(params![adj.new_quantity.to_string(), adj.split_id])?;
        }
    }

    tx.commit()?;
    info!("Updated {} split-adjusted quantities", updated);
    Ok(updated)
}

/// Delete the valuations of a prune plan in a single transaction
pub fn delete_valuations(conn: &mut Connection, plan: &PrunePlan) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut deleted = 0;

    {
        let mut stmt =
            tx.prepare("DELETE FROM asset_valuations WHERE id = ?1 AND asset_id = ?2")?;
        for id in &plan.valuation_ids {
            deleted += stmt.execute(params![id, plan.asset_id])?;
        }
    }

    tx.commit()?;
    info!("Deleted {} valuations of asset {}", deleted, plan.asset_id);
    Ok(deleted)
}
