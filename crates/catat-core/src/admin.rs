//! Admin operations and the chat admin command grammar
//!
//! Grammar (admin address only):
//! - `upgrade <address> monthly <DD/MM>`: premium for one month from that date (current year)
//! - `upgrade <address> yearly <DD/MM>`: same, twelve months
//! - `status <address>`
//! - `block <address>` / `unblock <address>`
//!
//! The operations are shared with the REST surface and the CLI. Each successful
//! mutation is written to the admin action log on a best-effort basis.

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::User;

/// Sent to a user whose premium plan was just activated
pub const UPGRADE_NOTICE: &str = "🎉 Akun kamu sudah di-upgrade ke Premium! Unlimited transaksi.";

/// A parsed chat admin command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Upgrade {
        address: String,
        start: NaiveDate,
        months: u32,
    },
    Status {
        address: String,
    },
    Block {
        address: String,
    },
    Unblock {
        address: String,
    },
}

impl AdminCommand {
    /// Parse an admin message
    ///
    /// Returns `None` when the text is not an admin command at all, and
    /// `Some(Err(..))` for a recognised command with bad arguments.
    pub fn parse(text: &str, today: NaiveDate) -> Option<std::result::Result<Self, String>> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        let (&verb, args) = parts.split_first()?;

        match (verb.to_lowercase().as_str(), args) {
            ("upgrade", [address, period, start]) => {
                let months = match period.to_lowercase().as_str() {
                    "monthly" | "bulanan" => 1,
                    "yearly" | "tahunan" => 12,
                    other => return Some(Err(format!("Unknown period: {}", other))),
                };
                Some(parse_day_month(start, today.year()).map(|start| Self::Upgrade {
                    address: address.to_string(),
                    start,
                    months,
                }))
            }
            ("upgrade", _) => Some(Err(
                "Usage: upgrade <address> monthly <DD/MM>".to_string()
            )),
            ("status", [address]) => Some(Ok(Self::Status {
                address: address.to_string(),
            })),
            ("block", [address]) => Some(Ok(Self::Block {
                address: address.to_string(),
            })),
            ("unblock", [address]) => Some(Ok(Self::Unblock {
                address: address.to_string(),
            })),
            _ => None,
        }
    }
}

/// `DD/MM` in the given year
fn parse_day_month(s: &str, year: i32) -> std::result::Result<NaiveDate, String> {
    let (day, month) = s
        .split_once('/')
        .ok_or_else(|| format!("Invalid date (expected DD/MM): {}", s))?;
    let day: u32 = day
        .parse()
        .map_err(|_| format!("Invalid day: {}", day))?;
    let month: u32 = month
        .parse()
        .map_err(|_| format!("Invalid month: {}", month))?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| format!("Invalid date: {}", s))
}

/// Premium expiry for a start date and a number of months (midnight UTC)
pub fn premium_until(start: NaiveDate, months: u32) -> DateTime<Utc> {
    let end = start.checked_add_months(Months::new(months)).unwrap_or(start);
    Utc.from_utc_datetime(&end.and_time(chrono::NaiveTime::MIN))
}

fn log_action(
    db: &Database,
    admin: &str,
    action: &str,
    target: &str,
    details: Option<&serde_json::Value>,
) {
    if let Err(e) = db.log_admin_action(admin, action, Some(target), details) {
        warn!(admin, action, target, error = %e, "Failed to log admin action");
    }
}

/// Activate premium for `address` starting at `start`
pub fn upgrade_user(
    db: &Database,
    admin: &str,
    address: &str,
    start: NaiveDate,
    months: u32,
) -> Result<User> {
    if months == 0 {
        return Err(Error::InvalidData("months must be at least 1".into()));
    }
    let until = premium_until(start, months);
    let user = db.upgrade_to_premium(address, until)?;
    log_action(
        db,
        admin,
        "upgrade",
        address,
        Some(&json!({
            "start_date": start.to_string(),
            "months": months,
            "premium_until": until.to_rfc3339(),
        })),
    );
    info!(admin, address, %until, "User upgraded to premium");
    Ok(user)
}

/// Return `address` to the free plan
pub fn downgrade_user(db: &Database, admin: &str, address: &str) -> Result<User> {
    let user = db.downgrade_to_free(address)?;
    log_action(db, admin, "downgrade", address, None);
    info!(admin, address, "User downgraded to free");
    Ok(user)
}

/// Block or unblock `address`
pub fn set_user_blocked(db: &Database, admin: &str, address: &str, blocked: bool) -> Result<User> {
    let user = db.set_blocked(address, blocked)?;
    let action = if blocked { "block" } else { "unblock" };
    log_action(db, admin, action, address, None);
    info!(admin, address, blocked, "User block flag changed");
    Ok(user)
}

/// Look up `address`, failing with `NotFound`
pub fn user_status(db: &Database, address: &str) -> Result<User> {
    db.get_user_by_address(address)?
        .ok_or_else(|| Error::NotFound(format!("User {}", address)))
}

/// Chat rendering of a user's status
pub fn format_status(user: &User) -> String {
    let mut out = format!(
        "User: {}\nPlan: {}\nTx Count: {}\nBlocked: {}",
        user.address, user.plan, user.free_tx_count, user.blocked
    );
    if let Some(until) = user.premium_until {
        out.push_str(&format!("\nPremium Until: {}", until.format("%Y-%m-%d")));
    }
    out
}

/// Replies produced by running an admin command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminResponse {
    /// Reply to the admin
    pub reply: String,
    /// Optional `(address, text)` notification to the affected user
    pub notify: Option<(String, String)>,
}

impl AdminResponse {
    fn reply(text: String) -> Self {
        Self {
            reply: text,
            notify: None,
        }
    }
}

/// Run a chat admin command; failures are echoed back to the admin
pub fn execute(db: &Database, admin: &str, command: &AdminCommand) -> AdminResponse {
    match command {
        AdminCommand::Upgrade {
            address,
            start,
            months,
        } => match upgrade_user(db, admin, address, *start, *months) {
            Ok(_) => AdminResponse {
                reply: format!("✅ {} upgraded to Premium", address),
                notify: Some((address.clone(), UPGRADE_NOTICE.to_string())),
            },
            Err(e) => AdminResponse::reply(format!("Failed: {}", e)),
        },
        AdminCommand::Status { address } => match user_status(db, address) {
            Ok(user) => AdminResponse::reply(format_status(&user)),
            Err(e) => AdminResponse::reply(format!("Error: {}", e)),
        },
        AdminCommand::Block { address } => match set_user_blocked(db, admin, address, true) {
            Ok(_) => AdminResponse::reply(format!("✅ {} blocked", address)),
            Err(e) => AdminResponse::reply(format!("Failed: {}", e)),
        },
        AdminCommand::Unblock { address } => match set_user_blocked(db, admin, address, false) {
            Ok(_) => AdminResponse::reply(format!("✅ {} unblocked", address)),
            Err(e) => AdminResponse::reply(format!("Failed: {}", e)),
        },
    }
}
