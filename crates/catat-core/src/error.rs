//! Error types for Catat

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Every extraction attempt failed; carries the last underlying error
    #[error("Extraction failed after {attempts} attempts: {last}")]
    Extraction { attempts: u32, last: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Free transaction limit reached ({limit} transactions)")]
    QuotaExceeded { limit: i64 },

    #[error("No transaction to undo")]
    NothingToUndo,

    #[error("Undo window has expired")]
    WindowExpired,

    #[error("Messaging gateway error: {0}")]
    Gateway(String),
}

pub type Result<T> = std::result::Result<T, Error>;
