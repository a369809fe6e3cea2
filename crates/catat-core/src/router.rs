//! Message router: the per-conversation state machine
//!
//! One call to [`MessageRouter::handle`] processes one inbound message:
//!
//! 1. claim the message id in the dedup ledger (a lost claim ends processing)
//! 2. resolve or create the sender
//! 3. refuse blocked senders
//! 4. run admin commands when the sender is the admin
//! 5. dispatch on the sender's conversation state
//!
//! Replies go out through the messaging gateway. A failed send is logged and
//! does not undo whatever the message already changed.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::admin::{self, AdminCommand};
use crate::ai::AIClient;
use crate::config::LedgerConfig;
use crate::confidence::ConfidenceBand;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::extraction::{parse_amount, should_trigger_parsing, Extractor};
use crate::ledger::Ledger;
use crate::messaging::{bare_address, Gateway, MessagingGateway};
use crate::models::{
    Actor, CandidateTransaction, ConversationState, EditField, InboundMessage, PendingEdit,
    PendingRecord, Plan, Transaction, TransactionType, TransactionUpdate, User,
};
use crate::quota;
use crate::report::{format_report, format_rupiah, generate_report, ReportPeriod, ReportSummary};

const SYSTEM_ERROR: &str = "Maaf, terjadi kesalahan sistem 😔";
const BLOCKED: &str = "Akun Anda diblokir. Hubungi admin untuk informasi lebih lanjut.";
const INVALID_PLAN: &str = "Pilihan tidak valid. Ketik *1* untuk Free atau *2* untuk Premium.";
const NOT_UNDERSTOOD: &str =
    "Maaf, aku belum bisa memahami pesan ini 😅\n\nContoh: catat pemasukan 100000 gaji";
const LOW_CONFIDENCE: &str = "Aku kurang yakin dengan transaksi ini 🤔\n\nCoba tulis lebih jelas, contoh:\n• catat pemasukan 100000 gaji\n• beli bensin 50rb";
const IMAGE_UNREADABLE: &str =
    "Aku belum bisa membaca gambar ini 😅\n\nBisa kirim ulang atau ketik manual?";
const CONFIRM_DISCARDED: &str = "Oke, transaksi tidak disimpan 👍";
const NOTHING_TO_UNDO: &str = "Tidak ada transaksi untuk dibatalkan.";
const UNDO_FAILED: &str = "Gagal membatalkan transaksi 😔";
const UNDONE: &str = "✅ Transaksi terakhir dibatalkan!";
const REPORT_FAILED: &str = "Gagal membuat rekap 😔";
const EDIT_CANCELLED: &str = "Edit dibatalkan.";
const EDIT_USAGE: &str = "Format edit: *edit <ID> <field>*\nField: jumlah, kategori, deskripsi, tipe\n\nContoh: edit TX-250101093000-1A2B3C jumlah";
const DELETE_USAGE: &str = "Format hapus: *hapus <ID>*";
const HELP: &str = "Aku bisa bantu kamu:\n• Catat transaksi: \"catat pemasukan 100rb gaji\"\n• Kirim foto struk\n• Lihat rekap: \"rekap hari ini\", \"rekap bulan ini\"\n• Undo transaksi terakhir: \"undo\"\n• Ubah transaksi: \"edit <ID> jumlah\"\n• Hapus transaksi: \"hapus <ID>\"";

const REPORT_KEYWORDS: &[&str] = &["rekap", "laporan", "report"];
const UNDO_WORDS: &[&str] = &["undo", "batal"];
const APPROVE_WORDS: &[&str] = &["ya", "y", "yes", "ok", "simpan"];
const REJECT_WORDS: &[&str] = &["tidak", "no", "n", "batal"];

/// What handling a message amounted to
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    /// Message id was already claimed
    Duplicate,
    Blocked,
    AdminCommand,
    /// First contact: plan menu sent
    Onboarding,
    PlanSelected(Plan),
    InvalidPlanChoice,
    Recorded(Transaction),
    /// Mid-confidence candidate stored, waiting for approval
    ConfirmationRequested,
    /// Unrecognised reply while waiting for approval
    ConfirmationPending,
    Discarded,
    LowConfidence,
    NotUnderstood,
    QuotaExceeded,
    Undone(Transaction),
    UndoRefused,
    EditStarted,
    Edited(Transaction),
    EditCancelled,
    /// Bad value while editing; the edit stays pending
    EditInvalid,
    Deleted(Transaction),
    /// Edit or delete target does not exist for this user
    TransactionNotFound,
    Report(ReportSummary),
    ReportFailed,
    Help,
}

/// Routes inbound messages through the conversation state machine
#[derive(Clone)]
pub struct MessageRouter {
    db: Database,
    ledger: Ledger,
    extractor: Extractor,
    gateway: Gateway,
    config: LedgerConfig,
}

impl MessageRouter {
    pub fn new(db: Database, ai: AIClient, gateway: Gateway, config: LedgerConfig) -> Self {
        let ledger = Ledger::new(db.clone(), config.free_limit);
        let extractor = Extractor::new(ai, config.retry, config.utc_offset);
        Self {
            db,
            ledger,
            extractor,
            gateway,
            config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Process one inbound message
    ///
    /// Store failures after the dedup claim are answered with a generic
    /// apology and returned as errors.
    pub async fn handle(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<RouteOutcome> {
        if msg.message_id.trim().is_empty() {
            return Err(Error::InvalidData("Message without id".into()));
        }

        if !self.db.mark_processed(&msg.message_id)? {
            debug!(message_id = %msg.message_id, "Duplicate delivery, skipping");
            return Ok(RouteOutcome::Duplicate);
        }

        match self.route(msg, cancel).await {
            Ok(outcome) => {
                debug!(message_id = %msg.message_id, outcome = ?outcome, "Message handled");
                Ok(outcome)
            }
            Err(e) => {
                error!(message_id = %msg.message_id, error = %e, "Failed to handle message");
                self.reply(&msg.from, SYSTEM_ERROR).await;
                Err(e)
            }
        }
    }

    async fn route(&self, msg: &InboundMessage, cancel: &CancellationToken) -> Result<RouteOutcome> {
        let address = bare_address(&msg.from);
        let (user, created) = self.db.get_or_create_user(address)?;
        if created {
            info!(user_id = user.id, "New user");
        }

        if user.blocked {
            self.reply(&msg.from, BLOCKED).await;
            return Ok(RouteOutcome::Blocked);
        }

        if self.config.is_admin(address) {
            if let Some(parsed) = AdminCommand::parse(msg.text(), self.extractor.today()) {
                self.run_admin(msg, parsed).await;
                return Ok(RouteOutcome::AdminCommand);
            }
        }

        let state = if created {
            ConversationState::NewUser
        } else {
            self.db.get_state(user.id).unwrap_or_else(|e| {
                warn!(user_id = user.id, error = %e, "Could not read conversation state");
                ConversationState::ErrorState
            })
        };

        match state {
            ConversationState::NewUser => self.start_onboarding(&user, msg).await,
            ConversationState::OnboardingSelectPlan => self.select_plan(&user, msg).await,
            ConversationState::AwaitingConfirmRecord(pending) => {
                self.confirm_record(&user, msg, pending).await
            }
            ConversationState::EditingTransaction(pending) => {
                self.apply_edit(&user, msg, pending).await
            }
            ConversationState::ErrorState => {
                warn!(user_id = user.id, "Conversation in error state, treating as active");
                self.handle_active(&user, msg, cancel).await
            }
            ConversationState::Active => self.handle_active(&user, msg, cancel).await,
        }
    }

    async fn reply(&self, to: &str, text: &str) {
        if let Err(e) = self.gateway.send_text(to, text).await {
            warn!(to = bare_address(to), error = %e, "Failed to send reply");
        }
    }

    async fn run_admin(&self, msg: &InboundMessage, parsed: std::result::Result<AdminCommand, String>) {
        let admin = bare_address(&msg.from);
        match parsed {
            Ok(command) => {
                info!(admin, command = ?command, "Admin command");
                let response = admin::execute(&self.db, admin, &command);
                self.reply(&msg.from, &response.reply).await;
                if let Some((to, text)) = response.notify {
                    self.reply(&to, &text).await;
                }
            }
            Err(e) => self.reply(&msg.from, &format!("Failed: {}", e)).await,
        }
    }

    // Onboarding

    async fn start_onboarding(&self, user: &User, msg: &InboundMessage) -> Result<RouteOutcome> {
        self.db.set_state(
            user.id,
            &ConversationState::OnboardingSelectPlan,
            self.config.state_ttl,
        )?;
        let menu = format!(
            "Halo! Aku bot pencatat keuangan 📒\n\nPilih paket:\n1️⃣ Free ({} transaksi)\n2️⃣ Premium Rp10rb/bulan (hubungi admin {})\n\nKetik *1* atau *2* untuk memilih.",
            self.config.free_limit, self.config.admin_contact
        );
        self.reply(&msg.from, &menu).await;
        Ok(RouteOutcome::Onboarding)
    }

    async fn select_plan(&self, user: &User, msg: &InboundMessage) -> Result<RouteOutcome> {
        let (plan, text) = match msg.text().trim() {
            "1" => (
                Plan::Free,
                format!(
                    "✅ Paket Free aktif! Kamu bisa mencatat hingga {} transaksi.\n\nContoh penggunaan:\n• catat pemasukan 100000 gaji\n• beli bensin 50rb\n• atau kirim foto struk!",
                    self.config.free_limit
                ),
            ),
            "2" => (
                Plan::PendingPremium,
                format!(
                    "📞 Silakan hubungi admin di {} untuk upgrade ke Premium.\n\nSementara itu, kamu bisa pakai paket Free ({} transaksi).",
                    self.config.admin_contact, self.config.free_limit
                ),
            ),
            _ => {
                self.reply(&msg.from, INVALID_PLAN).await;
                return Ok(RouteOutcome::InvalidPlanChoice);
            }
        };

        self.db.set_plan(user.id, plan)?;
        self.db.clear_state(user.id)?;
        info!(user_id = user.id, plan = plan.as_str(), "Plan selected");
        self.reply(&msg.from, &text).await;
        Ok(RouteOutcome::PlanSelected(plan))
    }

    // Active state

    async fn handle_active(
        &self,
        user: &User,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<RouteOutcome> {
        let text = msg.text().trim().to_lowercase();

        if REPORT_KEYWORDS.iter().any(|kw| text.contains(kw)) {
            return self.send_report(user, msg, &text).await;
        }

        if UNDO_WORDS.contains(&text.as_str()) {
            return self.undo(user, msg).await;
        }

        if msg.is_image() {
            return self.record_from_image(user, msg, cancel).await;
        }

        let mut words = text.split_whitespace();
        match words.next() {
            Some("edit") => return self.start_edit(user, msg).await,
            Some("hapus") | Some("delete") => return self.delete(user, msg).await,
            _ => {}
        }

        if should_trigger_parsing(&text) {
            return self.record_from_text(user, msg, cancel).await;
        }

        self.reply(&msg.from, HELP).await;
        Ok(RouteOutcome::Help)
    }

    async fn send_report(&self, user: &User, msg: &InboundMessage, text: &str) -> Result<RouteOutcome> {
        let period = ReportPeriod::from_text(text);
        let (start, end) = period.current_range(self.config.utc_offset);

        match generate_report(&self.db, user.id, start, end) {
            Ok(summary) => {
                self.reply(&msg.from, &format_report(&summary, period.label()))
                    .await;
                Ok(RouteOutcome::Report(summary))
            }
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Failed to generate report");
                self.reply(&msg.from, REPORT_FAILED).await;
                Ok(RouteOutcome::ReportFailed)
            }
        }
    }

    async fn undo(&self, user: &User, msg: &InboundMessage) -> Result<RouteOutcome> {
        match self.ledger.undo_transaction(user.id, self.config.undo_window) {
            Ok(tx) => {
                self.reply(&msg.from, UNDONE).await;
                Ok(RouteOutcome::Undone(tx))
            }
            Err(Error::NothingToUndo) => {
                self.reply(&msg.from, NOTHING_TO_UNDO).await;
                Ok(RouteOutcome::UndoRefused)
            }
            Err(Error::WindowExpired) => {
                let text = format!(
                    "Waktu undo sudah habis ({} detik).",
                    self.config.undo_window.num_seconds()
                );
                self.reply(&msg.from, &text).await;
                Ok(RouteOutcome::UndoRefused)
            }
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Undo failed");
                self.reply(&msg.from, UNDO_FAILED).await;
                Ok(RouteOutcome::UndoRefused)
            }
        }
    }

    async fn record_from_text(
        &self,
        user: &User,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<RouteOutcome> {
        let candidate = match self.extractor.extract_text(msg.text(), cancel).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Text extraction failed");
                self.reply(&msg.from, NOT_UNDERSTOOD).await;
                return Ok(RouteOutcome::NotUnderstood);
            }
        };

        match ConfidenceBand::classify(candidate.confidence) {
            ConfidenceBand::Reject => {
                self.reply(&msg.from, LOW_CONFIDENCE).await;
                Ok(RouteOutcome::LowConfidence)
            }
            ConfidenceBand::Confirm => {
                self.request_confirmation(user, msg, candidate, msg.text())
                    .await
            }
            ConfidenceBand::Accept => {
                self.record(user, msg, &candidate, &msg.message_id, false)
                    .await
            }
        }
    }

    async fn record_from_image(
        &self,
        user: &User,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<RouteOutcome> {
        let url = msg.media_url.as_deref().unwrap_or_default();
        let image = match self.gateway.download_media(url).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                warn!(user_id = user.id, "Empty media download");
                self.reply(&msg.from, IMAGE_UNREADABLE).await;
                return Ok(RouteOutcome::NotUnderstood);
            }
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Media download failed");
                self.reply(&msg.from, IMAGE_UNREADABLE).await;
                return Ok(RouteOutcome::NotUnderstood);
            }
        };

        let candidate = match self.extractor.extract_image(&image, cancel).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Image extraction failed");
                self.reply(&msg.from, IMAGE_UNREADABLE).await;
                return Ok(RouteOutcome::NotUnderstood);
            }
        };

        match ConfidenceBand::classify(candidate.confidence) {
            ConfidenceBand::Reject => {
                self.reply(&msg.from, IMAGE_UNREADABLE).await;
                Ok(RouteOutcome::LowConfidence)
            }
            ConfidenceBand::Confirm => {
                let caption = match msg.text() {
                    "" => "[gambar]",
                    caption => caption,
                };
                self.request_confirmation(user, msg, candidate, caption)
                    .await
            }
            ConfidenceBand::Accept => {
                self.record(user, msg, &candidate, &msg.message_id, true)
                    .await
            }
        }
    }

    async fn request_confirmation(
        &self,
        user: &User,
        msg: &InboundMessage,
        candidate: CandidateTransaction,
        original_text: &str,
    ) -> Result<RouteOutcome> {
        let prompt = confirm_prompt(&candidate);
        let state = ConversationState::AwaitingConfirmRecord(PendingRecord {
            candidate,
            original_text: original_text.to_string(),
            source_message_id: msg.message_id.clone(),
        });
        self.db.set_state(user.id, &state, self.config.state_ttl)?;
        self.reply(&msg.from, &prompt).await;
        Ok(RouteOutcome::ConfirmationRequested)
    }

    /// Record a candidate and tell the user how it went
    async fn record(
        &self,
        user: &User,
        msg: &InboundMessage,
        candidate: &CandidateTransaction,
        source_message_id: &str,
        from_image: bool,
    ) -> Result<RouteOutcome> {
        let result = self.ledger.record_transaction(
            user.id,
            candidate,
            source_message_id,
            self.extractor.model_version(),
        );

        let tx = match result {
            Ok(tx) => tx,
            Err(Error::QuotaExceeded { limit }) => {
                let mut text = format!("❌ Limit free sudah habis ({} transaksi).", limit);
                if !self.config.admin_contact.is_empty() {
                    text.push_str(&format!(
                        "\n\nUpgrade ke Premium? Hubungi admin {}",
                        self.config.admin_contact
                    ));
                }
                self.reply(&msg.from, &text).await;
                return Ok(RouteOutcome::QuotaExceeded);
            }
            Err(e) => return Err(e),
        };

        let mut text = if from_image {
            format!(
                "✅ Transaksi dari gambar tersimpan!\n\n{} - {}\nID: {}",
                format_rupiah(tx.amount),
                tx.description,
                tx.reference
            )
        } else {
            format!(
                "✅ Transaksi tersimpan!\n\n{} {}\n{} - {}\n\nID: {}\nKetik *undo* dalam {} detik untuk membatalkan.",
                tx.tx_type.emoji(),
                tx.tx_type,
                format_rupiah(tx.amount),
                tx.description,
                tx.reference,
                self.config.undo_window.num_seconds()
            )
        };

        // `user` predates this record, so one more slot is now used
        if let Some(left) = quota::remaining_free(user, self.config.free_limit, Utc::now()) {
            text.push_str(&format!(
                "\nSisa kuota free: {} transaksi.",
                (left - 1).max(0)
            ));
        }

        self.reply(&msg.from, &text).await;
        Ok(RouteOutcome::Recorded(tx))
    }

    // Confirmation

    async fn confirm_record(
        &self,
        user: &User,
        msg: &InboundMessage,
        pending: PendingRecord,
    ) -> Result<RouteOutcome> {
        let answer = msg.text().trim().to_lowercase();

        if APPROVE_WORDS.contains(&answer.as_str()) {
            self.db.clear_state(user.id)?;
            return self
                .record(user, msg, &pending.candidate, &pending.source_message_id, false)
                .await;
        }

        if REJECT_WORDS.contains(&answer.as_str()) {
            self.db.clear_state(user.id)?;
            self.reply(&msg.from, CONFIRM_DISCARDED).await;
            return Ok(RouteOutcome::Discarded);
        }

        self.reply(&msg.from, &confirm_prompt(&pending.candidate))
            .await;
        Ok(RouteOutcome::ConfirmationPending)
    }

    // Edit and delete

    async fn start_edit(&self, user: &User, msg: &InboundMessage) -> Result<RouteOutcome> {
        let parts: Vec<&str> = msg.text().split_whitespace().collect();
        let (reference, field) = match parts.as_slice() {
            [_, reference, field] => match field.parse::<EditField>() {
                Ok(field) => (reference.to_uppercase(), field),
                Err(_) => {
                    self.reply(&msg.from, EDIT_USAGE).await;
                    return Ok(RouteOutcome::Help);
                }
            },
            _ => {
                self.reply(&msg.from, EDIT_USAGE).await;
                return Ok(RouteOutcome::Help);
            }
        };

        if self.owned_transaction(user, &reference)?.is_none() {
            self.reply(&msg.from, &not_found(&reference)).await;
            return Ok(RouteOutcome::TransactionNotFound);
        }

        let prompt = format!(
            "Kirim nilai baru untuk *{}* transaksi {}.\n{}\n\nKetik *batal* untuk membatalkan.",
            field_label(field),
            reference,
            field_hint(field)
        );
        self.db.set_state(
            user.id,
            &ConversationState::EditingTransaction(PendingEdit { reference, field }),
            self.config.state_ttl,
        )?;
        self.reply(&msg.from, &prompt).await;
        Ok(RouteOutcome::EditStarted)
    }

    async fn apply_edit(
        &self,
        user: &User,
        msg: &InboundMessage,
        pending: PendingEdit,
    ) -> Result<RouteOutcome> {
        let value = msg.text().trim();

        if value.eq_ignore_ascii_case("batal") {
            self.db.clear_state(user.id)?;
            self.reply(&msg.from, EDIT_CANCELLED).await;
            return Ok(RouteOutcome::EditCancelled);
        }

        let update = match build_update(pending.field, value) {
            Ok(update) => update,
            Err(hint) => {
                self.reply(&msg.from, &hint).await;
                return Ok(RouteOutcome::EditInvalid);
            }
        };

        let result =
            self.ledger
                .edit_transaction(&pending.reference, Some(user.id), &update, &Actor::User);
        self.db.clear_state(user.id)?;

        match result {
            Ok(tx) => {
                let text = format!(
                    "✏️ Transaksi {} diperbarui!\n\n{} {}\n{} - {} ({})",
                    tx.reference,
                    tx.tx_type.emoji(),
                    tx.tx_type,
                    format_rupiah(tx.amount),
                    tx.description,
                    tx.category
                );
                self.reply(&msg.from, &text).await;
                Ok(RouteOutcome::Edited(tx))
            }
            Err(Error::NotFound(_)) => {
                self.reply(&msg.from, &not_found(&pending.reference)).await;
                Ok(RouteOutcome::TransactionNotFound)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, user: &User, msg: &InboundMessage) -> Result<RouteOutcome> {
        let parts: Vec<&str> = msg.text().split_whitespace().collect();
        let reference = match parts.as_slice() {
            [_, reference] => reference.to_uppercase(),
            _ => {
                self.reply(&msg.from, DELETE_USAGE).await;
                return Ok(RouteOutcome::Help);
            }
        };

        match self
            .ledger
            .delete_transaction(&reference, Some(user.id), &Actor::User)
        {
            Ok(tx) => {
                self.reply(&msg.from, &format!("🗑️ Transaksi {} dihapus.", tx.reference))
                    .await;
                Ok(RouteOutcome::Deleted(tx))
            }
            Err(Error::NotFound(_)) => {
                self.reply(&msg.from, &not_found(&reference)).await;
                Ok(RouteOutcome::TransactionNotFound)
            }
            Err(e) => Err(e),
        }
    }

    fn owned_transaction(&self, user: &User, reference: &str) -> Result<Option<Transaction>> {
        Ok(self
            .db
            .get_transaction_by_reference(reference)?
            .filter(|tx| tx.user_id == user.id))
    }
}

fn confirm_prompt(candidate: &CandidateTransaction) -> String {
    format!(
        "Konfirmasi transaksi:\n{} {} {} - {}\n\nKetik *ya* untuk simpan atau *tidak* untuk batal.",
        candidate.tx_type.emoji(),
        candidate.tx_type,
        format_rupiah(candidate.amount),
        candidate.description
    )
}

fn not_found(reference: &str) -> String {
    format!("Transaksi {} tidak ditemukan.", reference)
}

fn field_label(field: EditField) -> &'static str {
    match field {
        EditField::Amount => "jumlah",
        EditField::Category => "kategori",
        EditField::Description => "deskripsi",
        EditField::Type => "tipe",
    }
}

fn field_hint(field: EditField) -> &'static str {
    match field {
        EditField::Amount => "Contoh: 75rb atau 75000",
        EditField::Category => "Contoh: makan, transport, gaji",
        EditField::Description => "Contoh: makan siang kantor",
        EditField::Type => "Ketik *pemasukan* atau *pengeluaran*",
    }
}

/// Turn a typed value into an update for `field`, or a hint for the user
fn build_update(field: EditField, value: &str) -> std::result::Result<TransactionUpdate, String> {
    let invalid = || format!("Nilai tidak valid. {}", field_hint(field));
    if value.is_empty() {
        return Err(invalid());
    }

    let mut update = TransactionUpdate::default();
    match field {
        EditField::Amount => update.amount = Some(parse_amount(value).ok_or_else(invalid)?),
        EditField::Category => update.category = Some(value.to_lowercase()),
        EditField::Description => update.description = Some(value.to_string()),
        EditField::Type => {
            update.tx_type = Some(value.parse::<TransactionType>().map_err(|_| invalid())?)
        }
    }
    Ok(update)
}
