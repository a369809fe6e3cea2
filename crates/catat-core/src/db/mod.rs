//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `users` - Users, plans, premium expiry, blocking
//! - `transactions` - Ledger rows and the statements the ledger service composes
//! - `conversation` - Per-user conversation state with expiry
//! - `dedup` - Idempotency ledger of processed inbound message ids
//! - `audit` - Audit log and admin action log

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod audit;
mod conversation;
mod dedup;
mod transactions;
mod users;

pub use audit::NewAuditEntry;
pub(crate) use audit::insert_audit;
pub(crate) use transactions::{
    hard_delete_transaction, insert_transaction, latest_live_transaction, soft_delete_transaction,
    transaction_by_reference, update_transaction, NewTransactionRow,
};
pub(crate) use users::{adjust_free_count, user_by_id};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "CATAT_DB_KEY";

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"catat-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Format a timestamp for storage
///
/// Fixed-width UTC with milliseconds, so string comparison in SQL matches time order.
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite CURRENT_TIMESTAMP format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `CATAT_DB_KEY` environment variable to be set.
    /// Returns an error if it is not set. Use `new_unencrypted()`
    /// for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = passphrase
            .map(derive_key)
            .transpose()?
            .map(|key| format!("PRAGMA key = 'x\"{}\"';", key));

        // Runs on every new pooled connection; the key must come first
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(ref pragma) = key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "catat_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path, suffix));
        }

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the single writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Users, keyed by messaging address
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                address TEXT NOT NULL UNIQUE,
                plan TEXT NOT NULL DEFAULT 'FREE'
                    CHECK (plan IN ('FREE', 'PREMIUM', 'PENDING_PREMIUM')),
                free_tx_count INTEGER NOT NULL DEFAULT 0 CHECK (free_tx_count >= 0),
                premium_until TEXT,
                blocked INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Ledger entries
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                reference TEXT NOT NULL UNIQUE,               -- TX-<yyMMddHHmmss>-<6 hex>
                user_id INTEGER NOT NULL REFERENCES users(id),
                tx_type TEXT NOT NULL CHECK (tx_type IN ('INCOME', 'EXPENSE')),
                amount REAL NOT NULL CHECK (amount >= 0),
                category TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                transaction_date TEXT NOT NULL,               -- YYYY-MM-DD
                source_message_id TEXT NOT NULL,
                confidence REAL NOT NULL,
                extraction_version TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_created
                ON transactions(user_id, deleted, created_at);
            CREATE INDEX IF NOT EXISTS idx_transactions_user_date
                ON transactions(user_id, transaction_date);

            -- Conversation state history; the newest live row wins
            CREATE TABLE IF NOT EXISTS conversation_states (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                state TEXT NOT NULL,
                context TEXT,                                 -- JSON, shape depends on state
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversation_states_user
                ON conversation_states(user_id, expires_at);

            -- Idempotency ledger
            CREATE TABLE IF NOT EXISTS message_dedup (
                id INTEGER PRIMARY KEY,
                message_id TEXT NOT NULL UNIQUE,
                processed_at TEXT NOT NULL
            );

            -- Append-only audit trail (no foreign keys: must outlive hard deletes)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                action TEXT NOT NULL,                         -- CREATE, UPDATE, DELETE, UNDO
                entity_type TEXT,
                entity_id INTEGER,
                before_value TEXT,                            -- JSON snapshot
                after_value TEXT,                             -- JSON snapshot
                actor TEXT NOT NULL,                          -- system, user, or admin address
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(user_id, created_at);

            -- Who upgraded/blocked whom
            CREATE TABLE IF NOT EXISTS admin_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                admin_address TEXT NOT NULL,
                action TEXT NOT NULL,
                target_address TEXT,
                details TEXT,                                 -- JSON
                created_at TEXT NOT NULL
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
