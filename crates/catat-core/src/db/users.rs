//! User operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Plan, User};

const USER_COLUMNS: &str =
    "id, address, plan, free_tx_count, premium_until, blocked, created_at, updated_at";

/// Helper to convert a row to User (column order: `USER_COLUMNS`)
fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let plan_str: String = row.get(2)?;
    let premium_until: Option<String> = row.get(4)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(User {
        id: row.get(0)?,
        address: row.get(1)?,
        plan: plan_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        free_tx_count: row.get(3)?,
        premium_until: premium_until.as_deref().map(parse_datetime),
        blocked: row.get::<_, i64>(5)? != 0,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

/// Read a user inside an open transaction
pub(crate) fn user_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_user).optional()?)
}

/// Add `delta` to a user's free transaction counter, never going below zero
pub(crate) fn adjust_free_count(
    conn: &Connection,
    user_id: i64,
    delta: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE users SET free_tx_count = MAX(free_tx_count + ?, 0), updated_at = ? WHERE id = ?",
        params![delta, format_datetime(now), user_id],
    )?;
    Ok(())
}

impl Database {
    /// Look up a user by address, creating it with defaults on first sight
    ///
    /// Returns the user and whether this call created it.
    pub fn get_or_create_user(&self, address: &str) -> Result<(User, bool)> {
        let conn = self.conn()?;
        let now = format_datetime(Utc::now());

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (address, created_at, updated_at) VALUES (?, ?, ?)",
            params![address, now, now],
        )?;

        let sql = format!("SELECT {} FROM users WHERE address = ?", USER_COLUMNS);
        let user = conn.query_row(&sql, params![address], row_to_user)?;

        Ok((user, inserted == 1))
    }

    /// Get a user by id
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        user_by_id(&conn, id)
    }

    /// Get a user by messaging address
    pub fn get_user_by_address(&self, address: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM users WHERE address = ?", USER_COLUMNS);
        Ok(conn.query_row(&sql, params![address], row_to_user).optional()?)
    }

    /// List users, newest first
    pub fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params![limit, offset], row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Count all users
    pub fn count_users(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Persist a plan selection (onboarding)
    pub fn set_plan(&self, user_id: i64, plan: Plan) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET plan = ?, updated_at = ? WHERE id = ?",
            params![plan.as_str(), format_datetime(Utc::now()), user_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("User {}", user_id)));
        }
        Ok(())
    }

    /// Activate premium for a user until the given instant
    pub fn upgrade_to_premium(&self, address: &str, until: DateTime<Utc>) -> Result<User> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET plan = 'PREMIUM', premium_until = ?, updated_at = ? WHERE address = ?",
            params![format_datetime(until), format_datetime(Utc::now()), address],
        )?;
        Self::updated_user(&conn, address, updated)
    }

    /// Return a user to the free plan
    pub fn downgrade_to_free(&self, address: &str) -> Result<User> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET plan = 'FREE', premium_until = NULL, updated_at = ? WHERE address = ?",
            params![format_datetime(Utc::now()), address],
        )?;
        Self::updated_user(&conn, address, updated)
    }

    /// Block or unblock a user
    pub fn set_blocked(&self, address: &str, blocked: bool) -> Result<User> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET blocked = ?, updated_at = ? WHERE address = ?",
            params![blocked, format_datetime(Utc::now()), address],
        )?;
        Self::updated_user(&conn, address, updated)
    }

    fn updated_user(conn: &Connection, address: &str, updated: usize) -> Result<User> {
        if updated == 0 {
            return Err(Error::NotFound(format!("User {}", address)));
        }
        let sql = format!("SELECT {} FROM users WHERE address = ?", USER_COLUMNS);
        Ok(conn.query_row(&sql, params![address], row_to_user)?)
    }
}
