//! Ledger service: record, undo, edit and delete transactions
//!
//! Every mutation runs in one `BEGIN IMMEDIATE` store transaction, so the quota
//! check, the counter update and the "most recent transaction" lookup cannot
//! race with a concurrent writer. Audit entries are written inside the same
//! transaction but are best-effort: a failed audit insert is logged and the
//! business mutation still commits.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, TransactionBehavior};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::db::{
    adjust_free_count, hard_delete_transaction, insert_audit, insert_transaction,
    latest_live_transaction, soft_delete_transaction, transaction_by_reference,
    update_transaction, user_by_id, Database, NewAuditEntry, NewTransactionRow,
};
use crate::error::{Error, Result};
use crate::models::{
    Actor, AuditAction, CandidateTransaction, Transaction, TransactionUpdate,
};
use crate::quota;

const ENTITY_TRANSACTION: &str = "transaction";

/// Human-facing reference for a transaction
///
/// `TX-<yyMMddHHmmss>-<first 6 hex chars of SHA-256(message id), upper case>`,
/// computable as soon as the source message id and creation time are known.
pub fn transaction_reference(message_id: &str, created_at: DateTime<Utc>) -> String {
    let digest = hex::encode_upper(Sha256::digest(message_id.as_bytes()));
    format!("TX-{}-{}", created_at.format("%y%m%d%H%M%S"), &digest[..6])
}

fn snapshot(tx: &Transaction) -> Option<serde_json::Value> {
    serde_json::to_value(tx).ok()
}

/// Append an audit entry, logging instead of failing
fn audit_best_effort(conn: &Connection, entry: NewAuditEntry) {
    if let Err(e) = insert_audit(conn, &entry) {
        warn!(
            action = entry.action.as_str(),
            entity_id = ?entry.entity_id,
            error = %e,
            "Failed to write audit log entry"
        );
    }
}

/// Transaction recording and correction over the store
#[derive(Clone)]
pub struct Ledger {
    db: Database,
    free_limit: i64,
}

impl Ledger {
    pub fn new(db: Database, free_limit: i64) -> Self {
        Self { db, free_limit }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn free_limit(&self) -> i64 {
        self.free_limit
    }

    /// Record an accepted or confirmed candidate for a user
    ///
    /// Fails with `QuotaExceeded` when the user is not premium-active and has
    /// used up the free allowance.
    pub fn record_transaction(
        &self,
        user_id: i64,
        candidate: &CandidateTransaction,
        source_message_id: &str,
        extraction_version: &str,
    ) -> Result<Transaction> {
        self.record_transaction_at(
            user_id,
            candidate,
            source_message_id,
            extraction_version,
            Utc::now(),
        )
    }

    /// `record_transaction` as of a given instant
    pub fn record_transaction_at(
        &self,
        user_id: i64,
        candidate: &CandidateTransaction,
        source_message_id: &str,
        extraction_version: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        if !candidate.amount.is_finite() || candidate.amount < 0.0 {
            return Err(Error::InvalidData(format!(
                "Invalid amount: {}",
                candidate.amount
            )));
        }

        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Re-read under the write lock so the quota decision is current
        let user = user_by_id(&tx, user_id)?
            .ok_or_else(|| Error::NotFound(format!("User {}", user_id)))?;

        if !quota::can_record(&user, self.free_limit, now) {
            return Err(Error::QuotaExceeded {
                limit: self.free_limit,
            });
        }

        let reference = transaction_reference(source_message_id, now);
        let id = insert_transaction(
            &tx,
            &NewTransactionRow {
                reference: &reference,
                user_id,
                tx_type: candidate.tx_type,
                amount: candidate.amount,
                category: &candidate.category,
                description: &candidate.description,
                transaction_date: candidate.date,
                source_message_id,
                confidence: candidate.confidence,
                extraction_version,
                created_at: now,
            },
        )?;

        if !quota::is_premium_active(&user, now) {
            adjust_free_count(&tx, user_id, 1, now)?;
        }

        let recorded = transaction_by_reference(&tx, &reference)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", reference)))?;

        audit_best_effort(
            &tx,
            NewAuditEntry {
                user_id: Some(user_id),
                action: AuditAction::Create,
                entity_type: ENTITY_TRANSACTION,
                entity_id: Some(id),
                before: None,
                after: snapshot(&recorded),
                actor: &Actor::User,
                created_at: now,
            },
        );

        tx.commit()?;

        info!(
            user_id,
            reference = %recorded.reference,
            tx_type = recorded.tx_type.as_str(),
            amount = recorded.amount,
            "Transaction recorded"
        );
        Ok(recorded)
    }

    /// Erase the user's most recent transaction if it is inside the undo window
    ///
    /// The window boundary is inclusive: a transaction exactly `window` old can
    /// still be undone.
    pub fn undo_transaction(&self, user_id: i64, window: Duration) -> Result<Transaction> {
        self.undo_transaction_at(user_id, window, Utc::now())
    }

    /// `undo_transaction` as of a given instant
    pub fn undo_transaction_at(
        &self,
        user_id: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let last = latest_live_transaction(&tx, user_id)?.ok_or(Error::NothingToUndo)?;

        if now - last.created_at > window {
            return Err(Error::WindowExpired);
        }

        hard_delete_transaction(&tx, last.id)?;

        // The counter belongs to the transaction's owner
        if let Some(owner) = user_by_id(&tx, last.user_id)? {
            if !quota::is_premium_active(&owner, now) {
                adjust_free_count(&tx, owner.id, -1, now)?;
            }
        }

        audit_best_effort(
            &tx,
            NewAuditEntry {
                user_id: Some(last.user_id),
                action: AuditAction::Undo,
                entity_type: ENTITY_TRANSACTION,
                entity_id: Some(last.id),
                before: snapshot(&last),
                after: None,
                actor: &Actor::User,
                created_at: now,
            },
        );

        tx.commit()?;

        info!(user_id, reference = %last.reference, "Transaction undone");
        Ok(last)
    }

    /// Apply a partial update to a live transaction
    ///
    /// With `owner` set, a transaction belonging to someone else is reported as
    /// not found.
    pub fn edit_transaction(
        &self,
        reference: &str,
        owner: Option<i64>,
        update: &TransactionUpdate,
        actor: &Actor,
    ) -> Result<Transaction> {
        if update.is_empty() {
            return Err(Error::InvalidData("Nothing to update".into()));
        }
        if let Some(amount) = update.amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(Error::InvalidData(format!("Invalid amount: {}", amount)));
            }
        }

        let now = Utc::now();
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let before = Self::owned_transaction(&tx, reference, owner)?;
        update_transaction(&tx, before.id, update, now)?;
        let after = transaction_by_reference(&tx, reference)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", reference)))?;

        audit_best_effort(
            &tx,
            NewAuditEntry {
                user_id: Some(before.user_id),
                action: AuditAction::Update,
                entity_type: ENTITY_TRANSACTION,
                entity_id: Some(before.id),
                before: snapshot(&before),
                after: snapshot(&after),
                actor,
                created_at: now,
            },
        );

        tx.commit()?;

        info!(reference, actor = %actor, "Transaction edited");
        Ok(after)
    }

    /// Soft-delete a live transaction
    pub fn delete_transaction(
        &self,
        reference: &str,
        owner: Option<i64>,
        actor: &Actor,
    ) -> Result<Transaction> {
        let now = Utc::now();
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = Self::owned_transaction(&tx, reference, owner)?;
        soft_delete_transaction(&tx, existing.id, now)?;

        audit_best_effort(
            &tx,
            NewAuditEntry {
                user_id: Some(existing.user_id),
                action: AuditAction::Delete,
                entity_type: ENTITY_TRANSACTION,
                entity_id: Some(existing.id),
                before: snapshot(&existing),
                after: None,
                actor,
                created_at: now,
            },
        );

        tx.commit()?;

        info!(reference, actor = %actor, "Transaction deleted");
        Ok(existing)
    }

    fn owned_transaction(
        conn: &Connection,
        reference: &str,
        owner: Option<i64>,
    ) -> Result<Transaction> {
        match transaction_by_reference(conn, reference)? {
            Some(tx) if owner.map_or(true, |id| id == tx.user_id) => Ok(tx),
            _ => Err(Error::NotFound(format!("Transaction {}", reference))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    use crate::models::{AuditAction, Plan, TransactionType};

    fn candidate(tx_type: TransactionType, amount: f64) -> CandidateTransaction {
        CandidateTransaction {
            tx_type,
            amount,
            category: "makan".to_string(),
            description: "nasi goreng".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            confidence: 0.9,
        }
    }

    fn setup(limit: i64) -> (Ledger, i64) {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("6281234567890").unwrap();
        (Ledger::new(db, limit), user.id)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_transaction_reference_format() {
        let reference = transaction_reference("wamid.ABC", t0());
        assert!(reference.starts_with("TX-250501030405-"));
        let suffix = reference.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        // Deterministic
        assert_eq!(reference, transaction_reference("wamid.ABC", t0()));
    }

    #[test]
    fn test_record_increments_counter_and_audits() {
        let (ledger, user_id) = setup(10);
        let tx = ledger
            .record_transaction_at(user_id, &candidate(TransactionType::Expense, 15000.0), "m1", "mock", t0())
            .unwrap();

        assert_eq!(tx.amount, 15000.0);
        assert_eq!(tx.source_message_id, "m1");
        assert_eq!(tx.extraction_version, "mock");

        let user = ledger.db().get_user(user_id).unwrap().unwrap();
        assert_eq!(user.free_tx_count, 1);

        let audit = ledger.db().list_audit_log(Some(user_id), 10).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Create);
        assert_eq!(audit[0].actor, "user");
        assert!(audit[0].after.is_some());
    }

    #[test]
    fn test_quota_limit_is_exact() {
        let (ledger, user_id) = setup(3);
        for i in 0..3 {
            ledger
                .record_transaction(user_id, &candidate(TransactionType::Expense, 1.0), &format!("m{}", i), "mock")
                .unwrap();
        }
        let err = ledger
            .record_transaction(user_id, &candidate(TransactionType::Expense, 1.0), "m3", "mock")
            .unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { limit: 3 }));
        assert_eq!(ledger.db().count_live_transactions(user_id).unwrap(), 3);
    }

    #[test]
    fn test_premium_user_not_limited_or_counted() {
        let (ledger, user_id) = setup(1);
        let until = Utc::now() + Duration::days(30);
        ledger
            .db()
            .upgrade_to_premium("6281234567890", until)
            .unwrap();

        for i in 0..3 {
            ledger
                .record_transaction(user_id, &candidate(TransactionType::Income, 5.0), &format!("p{}", i), "mock")
                .unwrap();
        }
        let user = ledger.db().get_user(user_id).unwrap().unwrap();
        assert_eq!(user.plan, Plan::Premium);
        assert_eq!(user.free_tx_count, 0);
    }

    #[test]
    fn test_undo_window_boundary_inclusive() {
        let (ledger, user_id) = setup(10);
        let window = Duration::seconds(60);

        ledger
            .record_transaction_at(user_id, &candidate(TransactionType::Expense, 1.0), "a", "mock", t0())
            .unwrap();
        let undone = ledger
            .undo_transaction_at(user_id, window, t0() + window)
            .unwrap();
        assert_eq!(undone.source_message_id, "a");

        ledger
            .record_transaction_at(user_id, &candidate(TransactionType::Expense, 1.0), "b", "mock", t0())
            .unwrap();
        let err = ledger
            .undo_transaction_at(user_id, window, t0() + window + Duration::milliseconds(1))
            .unwrap_err();
        assert!(matches!(err, Error::WindowExpired));
    }

    #[test]
    fn test_record_then_undo_restores_counter() {
        let (ledger, user_id) = setup(10);
        ledger
            .record_transaction_at(user_id, &candidate(TransactionType::Expense, 9.0), "x", "mock", t0())
            .unwrap();
        ledger
            .undo_transaction_at(user_id, Duration::seconds(60), t0() + Duration::seconds(5))
            .unwrap();

        let user = ledger.db().get_user(user_id).unwrap().unwrap();
        assert_eq!(user.free_tx_count, 0);
        assert_eq!(ledger.db().count_live_transactions(user_id).unwrap(), 0);

        let audit = ledger.db().list_audit_log(Some(user_id), 10).unwrap();
        assert_eq!(audit[0].action, AuditAction::Undo);
        assert!(audit[0].before.is_some());
    }

    #[test]
    fn test_undo_without_transaction() {
        let (ledger, user_id) = setup(10);
        let err = ledger
            .undo_transaction(user_id, Duration::seconds(60))
            .unwrap_err();
        assert!(matches!(err, Error::NothingToUndo));
    }

    #[test]
    fn test_undo_only_touches_own_transactions() {
        let (ledger, alice) = setup(10);
        let (bob, _) = ledger.db().get_or_create_user("6289999999999").unwrap();

        ledger
            .record_transaction_at(bob.id, &candidate(TransactionType::Expense, 1.0), "bob-1", "mock", t0())
            .unwrap();
        let err = ledger
            .undo_transaction_at(alice, Duration::seconds(60), t0())
            .unwrap_err();
        assert!(matches!(err, Error::NothingToUndo));

        let bob = ledger.db().get_user(bob.id).unwrap().unwrap();
        assert_eq!(bob.free_tx_count, 1);
    }

    #[test]
    fn test_edit_transaction_applies_subset() {
        let (ledger, user_id) = setup(10);
        let tx = ledger
            .record_transaction(user_id, &candidate(TransactionType::Expense, 10.0), "e1", "mock")
            .unwrap();

        let update = TransactionUpdate {
            category: Some("transport".to_string()),
            ..Default::default()
        };
        let edited = ledger
            .edit_transaction(&tx.reference, Some(user_id), &update, &Actor::User)
            .unwrap();
        assert_eq!(edited.category, "transport");
        assert_eq!(edited.amount, 10.0);
        assert_eq!(edited.description, "nasi goreng");

        let audit = ledger.db().list_audit_log(Some(user_id), 1).unwrap();
        assert_eq!(audit[0].action, AuditAction::Update);
        assert_eq!(audit[0].before.as_ref().unwrap()["category"], "makan");
        assert_eq!(audit[0].after.as_ref().unwrap()["category"], "transport");
    }

    #[test]
    fn test_edit_rejects_other_owner_and_unknown_reference() {
        let (ledger, user_id) = setup(10);
        let tx = ledger
            .record_transaction(user_id, &candidate(TransactionType::Expense, 10.0), "e2", "mock")
            .unwrap();
        let update = TransactionUpdate {
            amount: Some(20.0),
            ..Default::default()
        };

        let err = ledger
            .edit_transaction(&tx.reference, Some(user_id + 100), &update, &Actor::User)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = ledger
            .edit_transaction("TX-000000000000-FFFFFF", None, &update, &Actor::System)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = ledger
            .edit_transaction(&tx.reference, None, &TransactionUpdate::default(), &Actor::System)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_delete_is_soft_and_hidden() {
        let (ledger, user_id) = setup(10);
        let tx = ledger
            .record_transaction(user_id, &candidate(TransactionType::Expense, 10.0), "d1", "mock")
            .unwrap();

        ledger
            .delete_transaction(&tx.reference, Some(user_id), &Actor::Admin("628000".into()))
            .unwrap();

        assert!(ledger
            .db()
            .get_transaction_by_reference(&tx.reference)
            .unwrap()
            .is_none());
        let raw = ledger.db().get_transaction(tx.id).unwrap().unwrap();
        assert!(raw.deleted);

        let audit = ledger.db().list_audit_log(Some(user_id), 1).unwrap();
        assert_eq!(audit[0].action, AuditAction::Delete);
        assert_eq!(audit[0].actor, "628000");

        // Deleted rows are not undo targets either
        let err = ledger
            .undo_transaction(user_id, Duration::seconds(600))
            .unwrap_err();
        assert!(matches!(err, Error::NothingToUndo));

        let err = ledger
            .delete_transaction(&tx.reference, None, &Actor::System)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
