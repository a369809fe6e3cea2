//! Runtime configuration for the message pipeline
//!
//! Environment variables (all optional):
//! - `FREE_TRANSACTION_LIMIT`: transactions allowed on the free plan (default: 10)
//! - `UNDO_WINDOW_SECONDS`: how long after creation a transaction can be undone (default: 60)
//! - `STATE_EXPIRY_MINUTES`: lifetime of a conversation state (default: 30)
//! - `TIMEZONE`: `Asia/Jakarta`, `Asia/Makassar` or `Asia/Jayapura` (default: Asia/Jakarta)
//! - `UTC_OFFSET_HOURS`: explicit offset, overrides `TIMEZONE`
//! - `ADMIN_MSISDN`: messaging address allowed to run admin commands
//! - `ADMIN_CONTACT`: number shown to users who want premium (default: `ADMIN_MSISDN`)
//! - `AI_MAX_RETRIES`: retries after the first extraction attempt (default: 2)
//! - `AI_RETRY_DELAY_SECONDS`: base back-off, multiplied by the attempt number (default: 2)

use chrono::{Duration, FixedOffset, Offset, Utc};
use tracing::warn;

use crate::extraction::RetryPolicy;

/// Pipeline configuration, built once at startup and passed down
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub free_limit: i64,
    pub undo_window: Duration,
    pub state_ttl: Duration,
    /// Offset used for "today" and report periods
    pub utc_offset: FixedOffset,
    pub admin_address: Option<String>,
    pub admin_contact: String,
    pub retry: RetryPolicy,
}

/// UTC+7, Western Indonesia Time
fn wib() -> FixedOffset {
    offset_for_zone("Asia/Jakarta").unwrap_or_else(|| Utc.fix())
}

/// Whole-hour offset east of UTC; `None` when out of range
fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    hours.checked_mul(3600).and_then(FixedOffset::east_opt)
}

/// Resolve an offset from an Indonesian zone name
fn offset_for_zone(name: &str) -> Option<FixedOffset> {
    let hours = match name {
        "Asia/Jakarta" | "Asia/Pontianak" | "WIB" => 7,
        "Asia/Makassar" | "WITA" => 8,
        "Asia/Jayapura" | "WIT" => 9,
        "UTC" | "Etc/UTC" => 0,
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            free_limit: 10,
            undo_window: Duration::seconds(60),
            state_ttl: Duration::minutes(30),
            utc_offset: wib(),
            admin_address: None,
            admin_contact: String::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Build configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(limit) = env_parse::<i64>("FREE_TRANSACTION_LIMIT") {
            config.free_limit = limit.max(0);
        }
        if let Some(secs) = env_parse::<i64>("UNDO_WINDOW_SECONDS") {
            config.undo_window = Duration::seconds(secs.max(0));
        }
        if let Some(mins) = env_parse::<i64>("STATE_EXPIRY_MINUTES") {
            config.state_ttl = Duration::minutes(mins.max(1));
        }

        if let Ok(zone) = std::env::var("TIMEZONE") {
            match offset_for_zone(zone.trim()) {
                Some(offset) => config.utc_offset = offset,
                None => warn!(zone = %zone, "Unknown TIMEZONE, using UTC+7"),
            }
        }
        if let Some(hours) = env_parse::<i32>("UTC_OFFSET_HOURS") {
            match offset_from_hours(hours) {
                Some(offset) => config.utc_offset = offset,
                None => warn!(hours, "UTC_OFFSET_HOURS out of range, ignoring"),
            }
        }

        config.admin_address = std::env::var("ADMIN_MSISDN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        config.admin_contact = std::env::var("ADMIN_CONTACT")
            .ok()
            .or_else(|| config.admin_address.clone())
            .unwrap_or_default();

        if let Some(retries) = env_parse::<u32>("AI_MAX_RETRIES") {
            config.retry.max_attempts = retries + 1;
        }
        if let Some(secs) = env_parse::<u64>("AI_RETRY_DELAY_SECONDS") {
            config.retry.base_delay = std::time::Duration::from_secs(secs);
        }

        config
    }

    /// Whether `address` is the configured admin
    pub fn is_admin(&self, address: &str) -> bool {
        self.admin_address.as_deref() == Some(address)
    }
}
