//! spendsmart-store: SQLite persistence for transactions and sync state
//!
//! One table, keyed UNIQUE on the Plaid transaction id. Every write is an
//! idempotent upsert; re-fetching overlapping windows never duplicates rows.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::Connection;
use spendsmart_core::category::{Categorization, Category};
use spendsmart_core::error::{Result, SpendError};
use spendsmart_core::transaction::Transaction;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    transaction_id TEXT NOT NULL UNIQUE,
    account_id TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    currency TEXT NOT NULL,
    date TEXT NOT NULL,
    name TEXT NOT NULL,
    merchant_name TEXT,
    description TEXT,
    is_pending INTEGER NOT NULL DEFAULT 0,
    category TEXT NOT NULL,
    subcategory TEXT NOT NULL DEFAULT '',
    category_confidence REAL NOT NULL DEFAULT 0,
    raw_payload TEXT,
    synced_to_sheets INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_transactions_synced
    ON transactions(synced_to_sheets);
CREATE INDEX IF NOT EXISTS idx_transactions_category
    ON transactions(category);
";

/// A persisted transaction together with its category assignment and
/// spreadsheet sync flag.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTransaction {
    pub transaction: Transaction,
    pub categorization: Categorization,
    pub synced: bool,
}

pub struct Store {
    conn: Connection,
}

fn db_err(e: rusqlite::Error) -> SpendError {
    SpendError::StorageUnavailable(e.to_string())
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Store> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Store { conn })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Store> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Store { conn })
    }

    /// Insert-or-update keyed on the external transaction id. Updates
    /// refresh the category assignment and mutable fields but never touch
    /// the sync flag (false->true transitions happen only in mark_synced).
    pub fn upsert(&self, tx: &Transaction, cat: &Categorization) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO transactions (
                    transaction_id, account_id, amount_cents, currency, date,
                    name, merchant_name, description, is_pending,
                    category, subcategory, category_confidence, raw_payload
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(transaction_id) DO UPDATE SET
                    account_id = excluded.account_id,
                    amount_cents = excluded.amount_cents,
                    currency = excluded.currency,
                    date = excluded.date,
                    name = excluded.name,
                    merchant_name = excluded.merchant_name,
                    description = excluded.description,
                    is_pending = excluded.is_pending,
                    category = excluded.category,
                    subcategory = excluded.subcategory,
                    category_confidence = excluded.category_confidence,
                    raw_payload = excluded.raw_payload,
                    updated_at = datetime('now')",
                rusqlite::params![
                    tx.external_id,
                    tx.account_id,
                    tx.amount_cents,
                    tx.currency,
                    tx.posted.format("%Y-%m-%d").to_string(),
                    tx.name,
                    tx.merchant_name,
                    tx.description,
                    tx.pending as i64,
                    cat.category.label(),
                    cat.subcategory,
                    cat.confidence,
                    tx.raw.to_string(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Flip the sync flag to true for one external id. Only called after
    /// the spreadsheet acknowledged the row.
    pub fn mark_synced(&self, external_id: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE transactions
                 SET synced_to_sheets = 1, updated_at = datetime('now')
                 WHERE transaction_id = ?1",
                [external_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// External ids already persisted, used to filter a fetched batch down
    /// to new transactions.
    pub fn existing_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT transaction_id FROM transactions")
            .map_err(db_err)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<std::result::Result<HashSet<_>, _>>()
            .map_err(db_err)?;
        Ok(ids)
    }

    /// Rows not yet mirrored to the spreadsheet, oldest first.
    pub fn unsynced(&self) -> Result<Vec<StoredTransaction>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT transaction_id, account_id, amount_cents, currency,
                        date, name, merchant_name, description, is_pending,
                        category, subcategory, category_confidence,
                        raw_payload, synced_to_sheets
                 FROM transactions
                 WHERE synced_to_sheets = 0
                 ORDER BY date ASC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], row_to_stored)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT count(*) FROM transactions", [], |row| row.get(0))
            .map_err(db_err)
    }

    /// Spending totals per category: (label, row count, total cents spent).
    /// Amounts are summed as absolute values, largest total first.
    pub fn category_summary(&self) -> Result<Vec<(String, i64, i64)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT category, count(*), sum(abs(amount_cents))
                 FROM transactions
                 GROUP BY category
                 ORDER BY sum(abs(amount_cents)) DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredTransaction> {
    let date_str: String = row.get(4)?;
    let posted = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let label: String = row.get(9)?;
    let raw_str: Option<String> = row.get(12)?;
    let raw = raw_str
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null);

    Ok(StoredTransaction {
        transaction: Transaction {
            external_id: row.get(0)?,
            account_id: row.get(1)?,
            amount_cents: row.get(2)?,
            currency: row.get(3)?,
            posted,
            name: row.get(5)?,
            merchant_name: row.get(6)?,
            description: row.get(7)?,
            pending: row.get::<_, i64>(8)? != 0,
            raw,
        },
        categorization: Categorization {
            category: Category::parse_label(&label).unwrap_or(Category::Other),
            subcategory: row.get(10)?,
            confidence: row.get(11)?,
        },
        synced: row.get::<_, i64>(13)? != 0,
    })
}
