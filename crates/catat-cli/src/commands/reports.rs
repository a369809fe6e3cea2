//! Report command implementations

use anyhow::{Context, Result};
use catat_core::admin;
use catat_core::db::Database;
use catat_core::report::{format_rupiah, generate_report};
use catat_core::{LedgerConfig, ReportPeriod};
use chrono::NaiveDate;

/// Resolve `[start, end)` from a period name or custom dates
///
/// Named periods are evaluated in the configured local offset.
pub fn resolve_period(
    period: &str,
    custom_from: Option<&str>,
    custom_to: Option<&str>,
) -> Result<(NaiveDate, NaiveDate)> {
    // If custom dates provided, use those
    if let (Some(from), Some(to)) = (custom_from, custom_to) {
        let from_date = NaiveDate::parse_from_str(from, "%Y-%m-%d")
            .context("Invalid --from date format (use YYYY-MM-DD)")?;
        let to_date = NaiveDate::parse_from_str(to, "%Y-%m-%d")
            .context("Invalid --to date format (use YYYY-MM-DD)")?;
        if to_date <= from_date {
            anyhow::bail!("--to must be after --from");
        }
        return Ok((from_date, to_date));
    }

    let period: ReportPeriod = period.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    Ok(period.current_range(LedgerConfig::from_env().utc_offset))
}

pub fn cmd_report(db: &Database, address: &str, start: NaiveDate, end: NaiveDate) -> Result<()> {
    let user = admin::user_status(db, address)?;
    let summary = generate_report(db, user.id, start, end)?;

    println!();
    println!("📊 Report for {} ({} to {})", user.address, start, end);
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Income:      {:>18}", format_rupiah(summary.total_income));
    println!("   Expense:     {:>18}", format_rupiah(summary.total_expense));
    println!("   Net balance: {:>18}", format_rupiah(summary.net_balance));
    println!("   Transactions: {}", summary.transaction_count);

    if !summary.by_category.is_empty() {
        let mut categories: Vec<_> = summary.by_category.iter().collect();
        categories.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));

        println!();
        println!("   By category:");
        for (category, amount) in categories {
            println!("   {:<20} {:>18}", category, format_rupiah(*amount));
        }
    }

    Ok(())
}
