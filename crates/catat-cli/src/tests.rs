//! CLI command tests

use catat_core::db::Database;
use catat_core::{
    AIClient, CandidateTransaction, ConfidenceBand, Ledger, LedgerConfig, MockBackend, Plan,
    RetryPolicy, TransactionType,
};
use chrono::{Datelike, NaiveDate, Utc};

use crate::commands::{self, parse_list, truncate};

const ALICE: &str = "6281200000001";

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn candidate(tx_type: TransactionType, amount: f64, category: &str) -> CandidateTransaction {
    CandidateTransaction {
        tx_type,
        amount,
        category: category.to_string(),
        description: format!("{} {}", category, amount),
        date: Utc::now().date_naive(),
        confidence: 0.9,
    }
}

/// Create a user with one expense and one income, returning the user id
fn seed_user(db: &Database) -> i64 {
    let (user, _) = db.get_or_create_user(ALICE).unwrap();
    let ledger = Ledger::new(db.clone(), 10);
    ledger
        .record_transaction(
            user.id,
            &candidate(TransactionType::Expense, 50000.0, "transport"),
            "msg-1",
            "mock",
        )
        .unwrap();
    ledger
        .record_transaction(
            user.id,
            &candidate(TransactionType::Income, 200000.0, "gaji"),
            "msg-2",
            "mock",
        )
        .unwrap();
    user.id
}

// ========== Users Command Tests ==========

#[test]
fn test_cmd_users_list_empty_and_populated() {
    let db = setup_test_db();
    assert!(commands::cmd_users_list(&db, 20, 0).is_ok());

    seed_user(&db);
    assert!(commands::cmd_users_list(&db, 20, 0).is_ok());
    // Non-positive limits are clamped rather than rejected
    assert!(commands::cmd_users_list(&db, 0, -5).is_ok());
}

#[test]
fn test_cmd_users_show() {
    let db = setup_test_db();
    seed_user(&db);
    assert!(commands::cmd_users_show(&db, ALICE).is_ok());
}

#[test]
fn test_cmd_users_show_unknown() {
    let db = setup_test_db();
    assert!(commands::cmd_users_show(&db, "6280000000000").is_err());
}

#[test]
fn test_cmd_users_upgrade_with_start() {
    let db = setup_test_db();
    seed_user(&db);

    commands::cmd_users_upgrade(&db, ALICE, Some("2025-03-15"), 2).unwrap();

    let user = db.get_user_by_address(ALICE).unwrap().unwrap();
    assert_eq!(user.plan, Plan::Premium);
    let until = user.premium_until.unwrap();
    assert_eq!(until.date_naive(), NaiveDate::from_ymd_opt(2025, 5, 15).unwrap());

    let actions = db.list_admin_actions(10).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, "upgrade");
    assert_eq!(actions[0].admin_address, commands::CLI_ADMIN);
}

#[test]
fn test_cmd_users_upgrade_defaults_to_today() {
    let db = setup_test_db();
    seed_user(&db);

    commands::cmd_users_upgrade(&db, ALICE, None, 1).unwrap();

    let user = db.get_user_by_address(ALICE).unwrap().unwrap();
    assert!(user.premium_until.unwrap() > Utc::now());
}

#[test]
fn test_cmd_users_upgrade_invalid() {
    let db = setup_test_db();
    seed_user(&db);

    assert!(commands::cmd_users_upgrade(&db, ALICE, Some("15/03/2025"), 1).is_err());
    assert!(commands::cmd_users_upgrade(&db, ALICE, Some("2025-03-15"), 0).is_err());
    assert!(commands::cmd_users_upgrade(&db, "6280000000000", None, 1).is_err());

    let user = db.get_user_by_address(ALICE).unwrap().unwrap();
    assert_eq!(user.plan, Plan::Free);
}

#[test]
fn test_cmd_users_downgrade() {
    let db = setup_test_db();
    seed_user(&db);
    commands::cmd_users_upgrade(&db, ALICE, Some("2025-03-15"), 1).unwrap();

    commands::cmd_users_downgrade(&db, ALICE).unwrap();

    let user = db.get_user_by_address(ALICE).unwrap().unwrap();
    assert_eq!(user.plan, Plan::Free);
    assert!(user.premium_until.is_none());
}

#[test]
fn test_cmd_users_block_and_unblock() {
    let db = setup_test_db();
    seed_user(&db);

    commands::cmd_users_set_blocked(&db, ALICE, true).unwrap();
    assert!(db.get_user_by_address(ALICE).unwrap().unwrap().blocked);

    commands::cmd_users_set_blocked(&db, ALICE, false).unwrap();
    assert!(!db.get_user_by_address(ALICE).unwrap().unwrap().blocked);

    let actions: Vec<String> = db
        .list_admin_actions(10)
        .unwrap()
        .into_iter()
        .map(|a| a.action)
        .collect();
    assert_eq!(actions, vec!["unblock", "block"]);
}

// ========== Transactions / Logs Command Tests ==========

#[test]
fn test_cmd_transactions_list() {
    let db = setup_test_db();
    seed_user(&db);
    assert!(commands::cmd_transactions_list(&db, ALICE, 20).is_ok());
}

#[test]
fn test_cmd_transactions_list_empty_user() {
    let db = setup_test_db();
    db.get_or_create_user(ALICE).unwrap();
    assert!(commands::cmd_transactions_list(&db, ALICE, 20).is_ok());
}

#[test]
fn test_cmd_transactions_list_unknown_user() {
    let db = setup_test_db();
    assert!(commands::cmd_transactions_list(&db, ALICE, 20).is_err());
}

#[test]
fn test_cmd_audit() {
    let db = setup_test_db();
    assert!(commands::cmd_audit(&db, None, 50).is_ok());

    seed_user(&db);
    assert!(commands::cmd_audit(&db, None, 50).is_ok());
    assert!(commands::cmd_audit(&db, Some(ALICE), 50).is_ok());
    assert!(commands::cmd_audit(&db, Some("6280000000000"), 50).is_err());
}

#[test]
fn test_cmd_admin_actions() {
    let db = setup_test_db();
    assert!(commands::cmd_admin_actions(&db, 50).is_ok());

    seed_user(&db);
    commands::cmd_users_upgrade(&db, ALICE, Some("2025-03-15"), 1).unwrap();
    assert!(commands::cmd_admin_actions(&db, 50).is_ok());
}

// ========== Report Command Tests ==========

#[test]
fn test_resolve_period_custom() {
    let (start, end) =
        commands::resolve_period("month", Some("2025-01-01"), Some("2025-02-01")).unwrap();
    assert_eq!(start, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    assert_eq!(end, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
}

#[test]
fn test_resolve_period_custom_invalid() {
    assert!(commands::resolve_period("month", Some("2025-13-01"), Some("2025-02-01")).is_err());
    assert!(commands::resolve_period("month", Some("2025-02-01"), Some("2025-01-01")).is_err());
}

#[test]
fn test_resolve_period_named() {
    let (start, end) = commands::resolve_period("month", None, None).unwrap();
    assert_eq!(start.day(), 1);
    assert!(end > start);

    let (start, end) = commands::resolve_period("today", None, None).unwrap();
    assert_eq!((end - start).num_days(), 1);

    let (start, end) = commands::resolve_period("week", None, None).unwrap();
    assert_eq!((end - start).num_days(), 7);
    assert_eq!(start.weekday(), chrono::Weekday::Mon);
}

#[test]
fn test_resolve_period_unknown() {
    assert!(commands::resolve_period("decade", None, None).is_err());
}

#[test]
fn test_cmd_report() {
    let db = setup_test_db();
    seed_user(&db);

    let today = Utc::now().date_naive();
    let start = today - chrono::Duration::days(2);
    let end = today + chrono::Duration::days(2);
    assert!(commands::cmd_report(&db, ALICE, start, end).is_ok());
    assert!(commands::cmd_report(&db, "6280000000000", start, end).is_err());
}

// ========== Maintenance Command Tests ==========

#[test]
fn test_cmd_cleanup() {
    let db = setup_test_db();
    assert!(db.mark_processed("msg-1").unwrap());

    commands::cmd_cleanup(&db, 7).unwrap();

    // Recent ids are kept
    assert!(!db.mark_processed("msg-1").unwrap());
}

#[test]
fn test_cmd_cleanup_rejects_zero_days() {
    let db = setup_test_db();
    assert!(commands::cmd_cleanup(&db, 0).is_err());
}

#[test]
fn test_init_and_status_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catat.db");

    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());

    assert!(commands::cmd_status(&path, true).is_ok());

    let db = commands::open_db(&path, true).unwrap();
    assert_eq!(db.count_users().unwrap(), 0);
}

#[test]
fn test_status_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.db");
    assert!(commands::cmd_status(&path, true).is_ok());
}

// ========== Parse Command Tests ==========

#[tokio::test]
async fn test_extract_candidate_text() {
    let config = LedgerConfig::default();
    let (candidate, band) = commands::extract_candidate(
        AIClient::mock(),
        RetryPolicy::immediate(1),
        &config,
        Some("beli bensin 50rb"),
        None,
    )
    .await
    .unwrap();

    assert_eq!(candidate.tx_type, TransactionType::Expense);
    assert_eq!(candidate.amount, 50000.0);
    assert_eq!(candidate.category, "transport");
    assert_eq!(band, ConfidenceBand::Accept);
}

#[tokio::test]
async fn test_extract_candidate_low_confidence() {
    let backend = MockBackend::new();
    backend.push_response(
        r#"{"type":"EXPENSE","amount":12000,"category":"makan","description":"makan","date":"","confidence":0.5}"#,
    );
    let config = LedgerConfig::default();
    let (_, band) = commands::extract_candidate(
        AIClient::Mock(backend),
        RetryPolicy::immediate(1),
        &config,
        Some("makan 12rb"),
        None,
    )
    .await
    .unwrap();

    assert_eq!(band, ConfidenceBand::Confirm);
}

#[tokio::test]
async fn test_extract_candidate_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("receipt.jpg");
    std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();

    let config = LedgerConfig::default();
    let (candidate, _) = commands::extract_candidate(
        AIClient::mock(),
        RetryPolicy::immediate(1),
        &config,
        None,
        Some(&path),
    )
    .await
    .unwrap();

    assert_eq!(candidate.amount, 25000.0);
    assert_eq!(candidate.category, "belanja");
}

#[tokio::test]
async fn test_extract_candidate_requires_input() {
    let config = LedgerConfig::default();
    let result = commands::extract_candidate(
        AIClient::mock(),
        RetryPolicy::immediate(1),
        &config,
        None,
        None,
    )
    .await;
    assert!(result.is_err());

    let missing = std::path::Path::new("/nonexistent/receipt.jpg");
    let result = commands::extract_candidate(
        AIClient::mock(),
        RetryPolicy::immediate(1),
        &config,
        None,
        Some(missing),
    )
    .await;
    assert!(result.is_err());
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a much longer description", 10), "a much ...");
    assert_eq!(truncate("kopi ☕ susu gula aren", 8), "kopi ...");
}

#[test]
fn test_parse_list() {
    assert_eq!(parse_list("a, b,,c "), vec!["a", "b", "c"]);
    assert!(parse_list("").is_empty());
}
