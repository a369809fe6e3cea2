//! Conversation state operations

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{format_datetime, Database};
use crate::error::{Error, Result};
use crate::models::ConversationState;

impl Database {
    /// Current conversation state of a user
    ///
    /// Rows past their expiry are ignored; with no live row the user is `Active`.
    pub fn get_state(&self, user_id: i64) -> Result<ConversationState> {
        self.get_state_at(user_id, Utc::now())
    }

    /// `get_state` evaluated at a given instant
    pub fn get_state_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<ConversationState> {
        let conn = self.conn()?;
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                r#"
                SELECT state, context FROM conversation_states
                WHERE user_id = ? AND expires_at > ?
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                "#,
                params![user_id, format_datetime(now)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((tag, context)) => {
                ConversationState::from_parts(&tag, context.as_deref()).map_err(Error::InvalidData)
            }
            None => Ok(ConversationState::Active),
        }
    }

    /// Record a new state for a user, live for `ttl`
    pub fn set_state(&self, user_id: i64, state: &ConversationState, ttl: Duration) -> Result<()> {
        self.set_state_at(user_id, state, ttl, Utc::now())
    }

    /// `set_state` as of a given instant
    pub fn set_state_at(
        &self,
        user_id: i64,
        state: &ConversationState,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let context = state.context_json()?;
        conn.execute(
            r#"
            INSERT INTO conversation_states (user_id, state, context, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                state.as_str(),
                context,
                format_datetime(now + ttl),
                format_datetime(now),
            ],
        )?;
        debug!(user_id, state = state.as_str(), "Conversation state set");
        Ok(())
    }

    /// Drop every state row of a user, returning them to `Active`
    pub fn clear_state(&self, user_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM conversation_states WHERE user_id = ?",
            params![user_id],
        )?;
        Ok(())
    }

    /// Delete every expired state row, returning how many were removed
    pub fn cleanup_expired_states(&self) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM conversation_states WHERE expires_at <= ?",
            params![format_datetime(Utc::now())],
        )?;
        Ok(removed)
    }
}
