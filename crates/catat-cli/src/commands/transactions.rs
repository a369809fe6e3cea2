//! Transaction, audit and admin log commands

use anyhow::Result;
use catat_core::admin;
use catat_core::db::Database;
use catat_core::report::format_rupiah;
use catat_core::TransactionType;

use super::truncate;

pub fn cmd_transactions_list(db: &Database, address: &str, limit: i64) -> Result<()> {
    let user = admin::user_status(db, address)?;
    let transactions = db.list_transactions(user.id, limit.max(1))?;

    if transactions.is_empty() {
        println!("No transactions recorded for {}.", user.address);
        return Ok(());
    }

    println!();
    println!("📝 Recent Transactions for {}", user.address);
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in transactions {
        let amount_str = match tx.tx_type {
            TransactionType::Expense => {
                format!("\x1b[31m-{}\x1b[0m", format_rupiah(tx.amount)) // Red for expenses
            }
            TransactionType::Income => {
                format!("\x1b[32m+{}\x1b[0m", format_rupiah(tx.amount)) // Green for income
            }
        };

        println!(
            "   {} │ {} │ {:>16} │ {:<12} │ {}",
            tx.transaction_date,
            tx.reference,
            amount_str,
            truncate(&tx.category, 12),
            truncate(&tx.description, 40)
        );
    }

    Ok(())
}

pub fn cmd_audit(db: &Database, address: Option<&str>, limit: i64) -> Result<()> {
    let user_id = match address {
        Some(address) => Some(admin::user_status(db, address)?.id),
        None => None,
    };
    let entries = db.list_audit_log(user_id, limit.max(1))?;

    if entries.is_empty() {
        println!("Audit log is empty.");
        return Ok(());
    }

    println!();
    println!("🧾 Audit Log");
    println!("   ─────────────────────────────────────────────────────────────");

    for entry in entries {
        let target = match (&entry.entity_type, entry.entity_id) {
            (Some(kind), Some(id)) => format!("{} #{}", kind, id),
            (Some(kind), None) => kind.clone(),
            _ => "-".to_string(),
        };
        println!(
            "   {} │ {:<6} │ {:<16} │ {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            target,
            entry.actor
        );
    }

    Ok(())
}

pub fn cmd_admin_actions(db: &Database, limit: i64) -> Result<()> {
    let actions = db.list_admin_actions(limit.max(1))?;

    if actions.is_empty() {
        println!("No admin actions recorded.");
        return Ok(());
    }

    println!();
    println!("🛡️  Admin Actions");
    println!("   ─────────────────────────────────────────────────────────────");

    for action in actions {
        let details = action
            .details
            .as_ref()
            .map(|d| serde_json::to_string(d).unwrap_or_default())
            .unwrap_or_default();
        println!(
            "   {} │ {:<10} │ {:<16} │ by {} {}",
            action.created_at.format("%Y-%m-%d %H:%M:%S"),
            action.action,
            action.target_address.as_deref().unwrap_or("-"),
            action.admin_address,
            details
        );
    }

    Ok(())
}
