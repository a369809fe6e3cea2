//! Audit log and admin action log

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{Actor, AdminAction, AuditAction, AuditEntry};

/// Audit entry about to be appended
#[derive(Debug, Clone)]
pub struct NewAuditEntry<'a> {
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub entity_type: &'a str,
    pub entity_id: Option<i64>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub actor: &'a Actor,
    pub created_at: DateTime<Utc>,
}

/// Append an audit entry using an existing connection (or open transaction)
pub(crate) fn insert_audit(conn: &Connection, entry: &NewAuditEntry) -> Result<i64> {
    let before = entry.before.as_ref().map(|v| v.to_string());
    let after = entry.after.as_ref().map(|v| v.to_string());
    conn.execute(
        r#"
        INSERT INTO audit_log (user_id, action, entity_type, entity_id, before_value, after_value, actor, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            entry.user_id,
            entry.action.as_str(),
            entry.entity_type,
            entry.entity_id,
            before,
            after,
            entry.actor.as_str(),
            format_datetime(entry.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn parse_json(value: Option<String>) -> Option<serde_json::Value> {
    value.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_audit_entry(row: &rusqlite::Row) -> rusqlite::Result<AuditEntry> {
    let action_str: String = row.get(2)?;
    let created_at: String = row.get(8)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        action: action_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        before: parse_json(row.get(5)?),
        after: parse_json(row.get(6)?),
        actor: row.get(7)?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Append an audit entry
    pub fn log_audit(&self, entry: &NewAuditEntry) -> Result<i64> {
        let conn = self.conn()?;
        insert_audit(&conn, entry)
    }

    /// List audit entries, newest first, optionally for one user
    pub fn list_audit_log(&self, user_id: Option<i64>, limit: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, action, entity_type, entity_id, before_value, after_value, actor, created_at
            FROM audit_log
            WHERE ?1 IS NULL OR user_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )?;

        let entries = stmt
            .query_map(params![user_id, limit], row_to_audit_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Record an administrative action
    pub fn log_admin_action(
        &self,
        admin_address: &str,
        action: &str,
        target_address: Option<&str>,
        details: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO admin_actions (admin_address, action, target_address, details, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                admin_address,
                action,
                target_address,
                details.map(|d| d.to_string()),
                format_datetime(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List administrative actions, newest first
    pub fn list_admin_actions(&self, limit: i64) -> Result<Vec<AdminAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, admin_address, action, target_address, details, created_at
            FROM admin_actions
            ORDER BY id DESC
            LIMIT ?
            "#,
        )?;

        let actions = stmt
            .query_map(params![limit], |row| {
                let created_at: String = row.get(5)?;
                Ok(AdminAction {
                    id: row.get(0)?,
                    admin_address: row.get(1)?,
                    action: row.get(2)?,
                    target_address: row.get(3)?,
                    details: parse_json(row.get(4)?),
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(actions)
    }
}
