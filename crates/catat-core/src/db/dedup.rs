//! Idempotency ledger of processed inbound message ids

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{format_datetime, Database};
use crate::error::Result;

impl Database {
    /// Whether a message id has already been claimed
    pub fn is_processed(&self, message_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM message_dedup WHERE message_id = ?",
            params![message_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Claim a message id
    ///
    /// Returns true only for the call that inserted the row, so concurrent
    /// deliveries of the same id cannot both proceed.
    pub fn mark_processed(&self, message_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO message_dedup (message_id, processed_at) VALUES (?, ?)",
            params![message_id, format_datetime(Utc::now())],
        )?;
        Ok(inserted == 1)
    }

    /// Forget message ids first seen before `older_than`
    pub fn cleanup_dedup(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM message_dedup WHERE processed_at < ?",
            params![format_datetime(older_than)],
        )?;
        Ok(removed)
    }
}
