//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db)
//! - `parse` - Extraction dry run against the configured provider
//! - `reports` - Report generation and period resolution
//! - `serve` - Webhook server command
//! - `status` - Database status and cleanup
//! - `transactions` - Transaction listing and the audit/admin logs
//! - `users` - User administration (plans, blocking)

pub mod core;
pub mod parse;
pub mod reports;
pub mod serve;
pub mod status;
pub mod transactions;
pub mod users;

// Re-export command functions for main.rs
pub use core::*;
pub use parse::*;
pub use reports::*;
pub use serve::*;
pub use status::*;
pub use transactions::*;
pub use users::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
