//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use rusqlite::params;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()
    }

    fn seed_transaction(db: &Database, user_id: i64, reference: &str, date: NaiveDate) -> i64 {
        let conn = db.conn().unwrap();
        insert_transaction(
            &conn,
            &NewTransactionRow {
                reference,
                user_id,
                tx_type: TransactionType::Expense,
                amount: 1000.0,
                category: "makan",
                description: "bakso",
                transaction_date: date,
                source_message_id: reference,
                confidence: 0.9,
                extraction_version: "mock",
                created_at: t0(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.count_users().unwrap(), 0);
        assert!(db.list_users(10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_schema_tables_exist() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        for table in [
            "users",
            "transactions",
            "conversation_states",
            "message_dedup",
            "audit_log",
            "admin_actions",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Database::in_memory().unwrap();
        db.get_or_create_user("628111").unwrap();
        db.run_migrations().unwrap();
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn test_get_or_create_user() {
        let db = Database::in_memory().unwrap();

        let (user, created) = db.get_or_create_user("628111").unwrap();
        assert!(created);
        assert_eq!(user.address, "628111");
        assert_eq!(user.plan, Plan::Free);
        assert_eq!(user.free_tx_count, 0);
        assert!(user.premium_until.is_none());
        assert!(!user.blocked);

        let (again, created) = db.get_or_create_user("628111").unwrap();
        assert!(!created);
        assert_eq!(again.id, user.id);
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn test_plan_changes() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();

        db.set_plan(user.id, Plan::PendingPremium).unwrap();
        assert_eq!(
            db.get_user(user.id).unwrap().unwrap().plan,
            Plan::PendingPremium
        );

        let until = Utc::now() + Duration::days(30);
        let upgraded = db.upgrade_to_premium("628111", until).unwrap();
        assert_eq!(upgraded.plan, Plan::Premium);
        assert_eq!(
            upgraded.premium_until.unwrap().timestamp_millis(),
            until.timestamp_millis()
        );

        let downgraded = db.downgrade_to_free("628111").unwrap();
        assert_eq!(downgraded.plan, Plan::Free);
        assert!(downgraded.premium_until.is_none());

        assert!(matches!(
            db.upgrade_to_premium("629999", until),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.set_plan(9999, Plan::Free),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_free_count_never_negative() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();
        let conn = db.conn().unwrap();

        adjust_free_count(&conn, user.id, -1, t0()).unwrap();
        assert_eq!(db.get_user(user.id).unwrap().unwrap().free_tx_count, 0);

        adjust_free_count(&conn, user.id, 2, t0()).unwrap();
        adjust_free_count(&conn, user.id, -1, t0()).unwrap();
        assert_eq!(db.get_user(user.id).unwrap().unwrap().free_tx_count, 1);
    }

    #[test]
    fn test_list_users_paginates() {
        let db = Database::in_memory().unwrap();
        for i in 0..5 {
            db.get_or_create_user(&format!("62800{}", i)).unwrap();
        }
        assert_eq!(db.list_users(2, 0).unwrap().len(), 2);
        assert_eq!(db.list_users(10, 4).unwrap().len(), 1);
        assert_eq!(db.count_users().unwrap(), 5);
    }

    #[test]
    fn test_mark_processed_claims_once() {
        let db = Database::in_memory().unwrap();

        assert!(!db.is_processed("wamid.1").unwrap());
        assert!(db.mark_processed("wamid.1").unwrap());
        assert!(!db.mark_processed("wamid.1").unwrap());
        assert!(db.is_processed("wamid.1").unwrap());

        let conn = db.conn().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM message_dedup", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_cleanup_dedup() {
        let db = Database::in_memory().unwrap();
        db.mark_processed("old").unwrap();

        assert_eq!(db.cleanup_dedup(Utc::now() - Duration::days(1)).unwrap(), 0);
        assert_eq!(db.cleanup_dedup(Utc::now() + Duration::seconds(1)).unwrap(), 1);
        assert!(!db.is_processed("old").unwrap());
    }

    #[test]
    fn test_state_defaults_to_active() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();
        assert_eq!(db.get_state(user.id).unwrap(), ConversationState::Active);
    }

    #[test]
    fn test_state_roundtrip_with_context() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();

        let pending = PendingRecord {
            candidate: CandidateTransaction {
                tx_type: TransactionType::Income,
                amount: 100_000.0,
                category: "gaji".into(),
                description: "gaji".into(),
                date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
                confidence: 0.55,
            },
            original_text: "catat pemasukan 100rb gaji".into(),
            source_message_id: "wamid.9".into(),
        };
        let state = ConversationState::AwaitingConfirmRecord(pending);
        db.set_state(user.id, &state, Duration::minutes(30)).unwrap();
        assert_eq!(db.get_state(user.id).unwrap(), state);

        // Newest row wins
        let edit = ConversationState::EditingTransaction(PendingEdit {
            reference: "TX-250501080000-ABCDEF".into(),
            field: EditField::Category,
        });
        db.set_state(user.id, &edit, Duration::minutes(30)).unwrap();
        assert_eq!(db.get_state(user.id).unwrap(), edit);

        db.clear_state(user.id).unwrap();
        assert_eq!(db.get_state(user.id).unwrap(), ConversationState::Active);
    }

    #[test]
    fn test_expired_state_is_never_returned() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();

        db.set_state_at(
            user.id,
            &ConversationState::OnboardingSelectPlan,
            Duration::minutes(30),
            t0(),
        )
        .unwrap();

        assert_eq!(
            db.get_state_at(user.id, t0() + Duration::minutes(29)).unwrap(),
            ConversationState::OnboardingSelectPlan
        );
        // Expiry is exclusive
        assert_eq!(
            db.get_state_at(user.id, t0() + Duration::minutes(30)).unwrap(),
            ConversationState::Active
        );
    }

    #[test]
    fn test_cleanup_expired_states() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();

        db.set_state_at(
            user.id,
            &ConversationState::OnboardingSelectPlan,
            Duration::minutes(1),
            Utc::now() - Duration::hours(1),
        )
        .unwrap();
        db.set_state(user.id, &ConversationState::NewUser, Duration::minutes(30))
            .unwrap();

        assert_eq!(db.cleanup_expired_states().unwrap(), 1);
        assert_eq!(db.get_state(user.id).unwrap(), ConversationState::NewUser);
    }

    #[test]
    fn test_corrupt_state_row_is_an_error() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();
        let conn = db.conn().unwrap();
        conn.execute(
            "INSERT INTO conversation_states (user_id, state, context, expires_at, created_at) VALUES (?, 'AWAITING_CONFIRM_RECORD', '{bad', ?, ?)",
            params![
                user.id,
                format_datetime(Utc::now() + Duration::hours(1)),
                format_datetime(Utc::now())
            ],
        )
        .unwrap();

        assert!(matches!(db.get_state(user.id), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_transaction_queries_skip_deleted() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();

        let keep = seed_transaction(&db, user.id, "TX-A", day);
        let gone = seed_transaction(&db, user.id, "TX-B", day);
        {
            let conn = db.conn().unwrap();
            soft_delete_transaction(&conn, gone, t0()).unwrap();
        }

        assert_eq!(db.count_live_transactions(user.id).unwrap(), 1);
        assert_eq!(db.list_transactions(user.id, 10).unwrap()[0].id, keep);
        assert!(db.get_transaction_by_reference("TX-B").unwrap().is_none());
        assert!(db.get_transaction(gone).unwrap().unwrap().deleted);

        let conn = db.conn().unwrap();
        assert_eq!(latest_live_transaction(&conn, user.id).unwrap().unwrap().id, keep);
    }

    #[test]
    fn test_transactions_in_range_is_half_open() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();
        let d = |day| NaiveDate::from_ymd_opt(2025, 5, day).unwrap();

        seed_transaction(&db, user.id, "TX-1", d(1));
        seed_transaction(&db, user.id, "TX-2", d(2));
        seed_transaction(&db, user.id, "TX-3", d(3));

        let in_range = db.transactions_in_range(user.id, d(1), d(3)).unwrap();
        let refs: Vec<&str> = in_range.iter().map(|t| t.reference.as_str()).collect();
        assert_eq!(refs, vec!["TX-1", "TX-2"]);
    }

    #[test]
    fn test_update_transaction_applies_subset() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();
        let id = seed_transaction(&db, user.id, "TX-U", t0().date_naive());

        let conn = db.conn().unwrap();
        update_transaction(
            &conn,
            id,
            &TransactionUpdate {
                tx_type: Some(TransactionType::Income),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();

        let tx = db.get_transaction(id).unwrap().unwrap();
        assert_eq!(tx.tx_type, TransactionType::Income);
        assert_eq!(tx.amount, 1000.0);
        assert_eq!(tx.category, "makan");
    }

    #[test]
    fn test_audit_log_filters_and_orders() {
        let db = Database::in_memory().unwrap();
        let (alice, _) = db.get_or_create_user("628111").unwrap();
        let (bob, _) = db.get_or_create_user("628222").unwrap();

        for (user_id, action) in [
            (alice.id, AuditAction::Create),
            (bob.id, AuditAction::Create),
            (alice.id, AuditAction::Undo),
        ] {
            db.log_audit(&NewAuditEntry {
                user_id: Some(user_id),
                action,
                entity_type: "transaction",
                entity_id: Some(1),
                before: None,
                after: Some(serde_json::json!({ "amount": 1 })),
                actor: &Actor::User,
                created_at: Utc::now(),
            })
            .unwrap();
        }

        let all = db.list_audit_log(None, 10).unwrap();
        assert_eq!(all.len(), 3);

        let alice_entries = db.list_audit_log(Some(alice.id), 10).unwrap();
        assert_eq!(alice_entries.len(), 2);
        assert_eq!(alice_entries[0].action, AuditAction::Undo);
        assert_eq!(alice_entries[1].after.as_ref().unwrap()["amount"], 1);
    }

    #[test]
    fn test_admin_action_log() {
        let db = Database::in_memory().unwrap();
        db.log_admin_action(
            "628000",
            "upgrade",
            Some("628111"),
            Some(&serde_json::json!({ "months": 1 })),
        )
        .unwrap();
        db.log_admin_action("628000", "block", Some("628222"), None)
            .unwrap();

        let actions = db.list_admin_actions(10).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action, "block");
        assert_eq!(actions[1].details.as_ref().unwrap()["months"], 1);
    }
}
