//! Transaction operations
//!
//! The free functions take a bare `Connection` so the ledger service can compose
//! them inside one write-locked store transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{Transaction, TransactionType, TransactionUpdate};

const TX_COLUMNS: &str = "id, reference, user_id, tx_type, amount, category, description, \
     transaction_date, source_message_id, confidence, extraction_version, deleted, \
     created_at, updated_at";

/// Row about to be inserted into `transactions`
#[derive(Debug, Clone)]
pub(crate) struct NewTransactionRow<'a> {
    pub reference: &'a str,
    pub user_id: i64,
    pub tx_type: TransactionType,
    pub amount: f64,
    pub category: &'a str,
    pub description: &'a str,
    pub transaction_date: NaiveDate,
    pub source_message_id: &'a str,
    pub confidence: f64,
    pub extraction_version: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Helper to convert a row to Transaction (column order: `TX_COLUMNS`)
fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let type_str: String = row.get(3)?;
    let date_str: String = row.get(7)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;
    Ok(Transaction {
        id: row.get(0)?,
        reference: row.get(1)?,
        user_id: row.get(2)?,
        tx_type: type_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        amount: row.get(4)?,
        category: row.get(5)?,
        description: row.get(6)?,
        transaction_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or_default(),
        source_message_id: row.get(8)?,
        confidence: row.get(9)?,
        extraction_version: row.get(10)?,
        deleted: row.get::<_, i64>(11)? != 0,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

pub(crate) fn insert_transaction(conn: &Connection, tx: &NewTransactionRow) -> Result<i64> {
    let created_at = format_datetime(tx.created_at);
    conn.execute(
        r#"
        INSERT INTO transactions (reference, user_id, tx_type, amount, category, description,
                                  transaction_date, source_message_id, confidence,
                                  extraction_version, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            tx.reference,
            tx.user_id,
            tx.tx_type.as_str(),
            tx.amount,
            tx.category,
            tx.description,
            tx.transaction_date.format("%Y-%m-%d").to_string(),
            tx.source_message_id,
            tx.confidence,
            tx.extraction_version,
            created_at,
            created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recently created live (not soft-deleted) transaction of a user
pub(crate) fn latest_live_transaction(
    conn: &Connection,
    user_id: i64,
) -> Result<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE user_id = ? AND deleted = 0 \
         ORDER BY created_at DESC, id DESC LIMIT 1",
        TX_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![user_id], row_to_transaction)
        .optional()?)
}

/// Live transaction by reference
pub(crate) fn transaction_by_reference(
    conn: &Connection,
    reference: &str,
) -> Result<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE reference = ? AND deleted = 0",
        TX_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![reference], row_to_transaction)
        .optional()?)
}

pub(crate) fn hard_delete_transaction(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM transactions WHERE id = ?", params![id])?;
    Ok(())
}

pub(crate) fn soft_delete_transaction(conn: &Connection, id: i64, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE transactions SET deleted = 1, updated_at = ? WHERE id = ?",
        params![format_datetime(now), id],
    )?;
    Ok(())
}

/// Apply the present fields of `update`; absent fields keep their value
pub(crate) fn update_transaction(
    conn: &Connection,
    id: i64,
    update: &TransactionUpdate,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE transactions
        SET amount = COALESCE(?, amount),
            category = COALESCE(?, category),
            description = COALESCE(?, description),
            tx_type = COALESCE(?, tx_type),
            updated_at = ?
        WHERE id = ?
        "#,
        params![
            update.amount,
            update.category,
            update.description,
            update.tx_type.map(|t| t.as_str()),
            format_datetime(now),
            id,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Get a live transaction by its reference
    pub fn get_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        transaction_by_reference(&conn, reference)
    }

    /// Get a transaction by id, including soft-deleted rows (for audit views)
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM transactions WHERE id = ?", TX_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], row_to_transaction)
            .optional()?)
    }

    /// List a user's live transactions, newest first
    pub fn list_transactions(&self, user_id: i64, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_id = ? AND deleted = 0 \
             ORDER BY created_at DESC, id DESC LIMIT ?",
            TX_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params![user_id, limit], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Live transactions whose transaction date is in `[start, end)`
    pub fn transactions_in_range(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM transactions \
             WHERE user_id = ? AND deleted = 0 AND transaction_date >= ? AND transaction_date < ? \
             ORDER BY transaction_date, id",
            TX_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(
                params![
                    user_id,
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string()
                ],
                row_to_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Count a user's live transactions
    pub fn count_live_transactions(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ? AND deleted = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
