//! User administration commands

use anyhow::{Context, Result};
use catat_core::admin;
use catat_core::db::Database;
use catat_core::quota::{is_premium_active, remaining_free};
use catat_core::LedgerConfig;
use chrono::{NaiveDate, Utc};

/// Identity recorded in the admin action log for CLI changes
pub const CLI_ADMIN: &str = "cli";

pub fn cmd_users_list(db: &Database, limit: i64, offset: i64) -> Result<()> {
    let users = db.list_users(limit.max(1), offset.max(0))?;

    if users.is_empty() {
        println!("No users yet. Users are created on their first message.");
        return Ok(());
    }

    let total = db.count_users()?;

    println!();
    println!("👥 Users ({} total)", total);
    println!("   ─────────────────────────────────────────────────────────────");

    for user in users {
        let blocked = if user.blocked { " 🚫" } else { "" };
        println!(
            "   {:<16} │ {:<15} │ {:>3} tx │ joined {}{}",
            user.address,
            user.plan.as_str(),
            user.free_tx_count,
            user.created_at.format("%Y-%m-%d"),
            blocked
        );
    }

    Ok(())
}

pub fn cmd_users_show(db: &Database, address: &str) -> Result<()> {
    let user = admin::user_status(db, address)?;
    let config = LedgerConfig::from_env();
    let now = Utc::now();

    println!();
    println!("{}", admin::format_status(&user));
    println!("Premium Active: {}", is_premium_active(&user, now));
    match remaining_free(&user, config.free_limit, now) {
        Some(left) => println!("Free Remaining: {}", left),
        None => println!("Free Remaining: unlimited"),
    }
    println!("Live Transactions: {}", db.count_live_transactions(user.id)?);

    Ok(())
}

pub fn cmd_users_upgrade(
    db: &Database,
    address: &str,
    start: Option<&str>,
    months: u32,
) -> Result<()> {
    let start = match start {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .context("Invalid --start date format (use YYYY-MM-DD)")?,
        None => {
            let offset = LedgerConfig::from_env().utc_offset;
            Utc::now().with_timezone(&offset).date_naive()
        }
    };

    let user = admin::upgrade_user(db, CLI_ADMIN, address, start, months)?;

    println!("✅ {} upgraded to Premium", user.address);
    if let Some(until) = user.premium_until {
        println!("   Premium until: {}", until.format("%Y-%m-%d"));
    }

    Ok(())
}

pub fn cmd_users_downgrade(db: &Database, address: &str) -> Result<()> {
    let user = admin::downgrade_user(db, CLI_ADMIN, address)?;
    println!("✅ {} returned to the Free plan", user.address);
    Ok(())
}

pub fn cmd_users_set_blocked(db: &Database, address: &str, blocked: bool) -> Result<()> {
    let user = admin::set_user_blocked(db, CLI_ADMIN, address, blocked)?;
    if blocked {
        println!("🚫 {} blocked", user.address);
    } else {
        println!("✅ {} unblocked", user.address);
    }
    Ok(())
}
