//! Status and maintenance command implementations

use std::path::Path;

use anyhow::Result;
use catat_core::db::Database;
use chrono::{Duration, Utc};

use super::open_db;

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    use catat_core::db::DB_KEY_ENV;
    use std::fs;

    println!();
    println!("📊 Catat Status");
    println!("   ─────────────────────────────────────────────────────────────");

    // Database path
    println!("   Database: {}", db_path.display());

    // Check if database file exists and get size
    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    // Check encryption status
    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    // Try to open the database and show stats
    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let Ok(users) = db.count_users() {
                    println!();
                    println!("   Users: {}", users);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

/// Remove expired states and dedup rows older than `dedup_days`
pub fn cmd_cleanup(db: &Database, dedup_days: i64) -> Result<()> {
    if dedup_days < 1 {
        anyhow::bail!("--dedup-days must be at least 1");
    }

    let report = catat_server::run_cleanup(db, Utc::now() - Duration::days(dedup_days))?;

    println!("🧹 Cleanup complete");
    println!("   Expired conversation states: {}", report.expired_states);
    println!("   Dedup rows older than {} days: {}", dedup_days, report.dedup_rows);

    Ok(())
}
