//! Domain models for Catat

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Subscription plan of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    #[default]
    Free,
    Premium,
    /// Asked for premium, waiting for an admin to activate it
    PendingPremium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Premium => "PREMIUM",
            Self::PendingPremium => "PENDING_PREMIUM",
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "PREMIUM" => Ok(Self::Premium),
            "PENDING_PREMIUM" | "PENDING" => Ok(Self::PendingPremium),
            _ => Err(format!("Unknown plan: {}", s)),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A chat user, identified by their messaging address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Stable messaging address (phone number / JID)
    pub address: String,
    pub plan: Plan,
    /// Transactions recorded while not premium-active
    pub free_tx_count: i64,
    pub premium_until: Option<DateTime<Utc>>,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
        }
    }

    /// Emoji used in chat replies
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Income => "💰",
            Self::Expense => "💸",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" | "pemasukan" | "masuk" => Ok(Self::Income),
            "expense" | "pengeluaran" | "keluar" => Ok(Self::Expense),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// Human-facing reference, e.g. `TX-250101093000-1A2B3C`
    pub reference: String,
    pub user_id: i64,
    pub tx_type: TransactionType,
    pub amount: f64,
    pub category: String,
    pub description: String,
    pub transaction_date: NaiveDate,
    pub source_message_id: String,
    pub confidence: f64,
    /// Model that produced the extraction
    pub extraction_version: String,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Unvalidated, confidence-scored extraction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTransaction {
    pub tx_type: TransactionType,
    pub amount: f64,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    pub confidence: f64,
}

/// Field of a transaction that can be edited from chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditField {
    Amount,
    Category,
    Description,
    Type,
}

impl EditField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amount => "amount",
            Self::Category => "category",
            Self::Description => "description",
            Self::Type => "type",
        }
    }
}

impl std::str::FromStr for EditField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amount" | "jumlah" | "nominal" => Ok(Self::Amount),
            "category" | "kategori" => Ok(Self::Category),
            "description" | "deskripsi" | "keterangan" => Ok(Self::Description),
            "type" | "tipe" | "jenis" => Ok(Self::Type),
            _ => Err(format!("Unknown field: {}", s)),
        }
    }
}

impl std::fmt::Display for EditField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Partial update applied by `Ledger::edit_transaction`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionUpdate {
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub tx_type: Option<TransactionType>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.tx_type.is_none()
    }
}

/// Context held while waiting for the user to approve a mid-confidence candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub candidate: CandidateTransaction,
    pub original_text: String,
    pub source_message_id: String,
}

/// Context held while waiting for the new value of an edited field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub reference: String,
    pub field: EditField,
}

/// Conversation state with its state-specific context
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConversationState {
    NewUser,
    OnboardingSelectPlan,
    #[default]
    Active,
    AwaitingConfirmRecord(PendingRecord),
    EditingTransaction(PendingEdit),
    /// Produced when the stored state could not be read
    ErrorState,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewUser => "NEW_USER",
            Self::OnboardingSelectPlan => "ONBOARDING_SELECT_PLAN",
            Self::Active => "ACTIVE",
            Self::AwaitingConfirmRecord(_) => "AWAITING_CONFIRM_RECORD",
            Self::EditingTransaction(_) => "EDITING_TRANSACTION",
            Self::ErrorState => "ERROR_STATE",
        }
    }

    /// JSON context column for this state, if it carries one
    pub fn context_json(&self) -> serde_json::Result<Option<String>> {
        match self {
            Self::AwaitingConfirmRecord(ctx) => serde_json::to_string(ctx).map(Some),
            Self::EditingTransaction(ctx) => serde_json::to_string(ctx).map(Some),
            _ => Ok(None),
        }
    }

    /// Rebuild a state from its stored tag and context
    pub fn from_parts(tag: &str, context: Option<&str>) -> std::result::Result<Self, String> {
        let context = || context.ok_or_else(|| format!("State {} is missing its context", tag));
        match tag {
            "NEW_USER" => Ok(Self::NewUser),
            "ONBOARDING_SELECT_PLAN" => Ok(Self::OnboardingSelectPlan),
            "ACTIVE" => Ok(Self::Active),
            "AWAITING_CONFIRM_RECORD" => serde_json::from_str(context()?)
                .map(Self::AwaitingConfirmRecord)
                .map_err(|e| format!("Invalid confirm context: {}", e)),
            "EDITING_TRANSACTION" => serde_json::from_str(context()?)
                .map(Self::EditingTransaction)
                .map_err(|e| format!("Invalid edit context: {}", e)),
            "ERROR_STATE" => Ok(Self::ErrorState),
            _ => Err(format!("Unknown conversation state: {}", tag)),
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit log action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Undo,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Undo => "UNDO",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "UNDO" => Ok(Self::Undo),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who performed an audited mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    System,
    User,
    /// Admin, identified by their messaging address
    Admin(String),
}

impl Actor {
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Admin(address) => address,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit log entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

/// Administrative action log entry
#[derive(Debug, Clone, Serialize)]
pub struct AdminAction {
    pub id: i64,
    pub admin_address: String,
    pub action: String,
    pub target_address: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Inbound chat message as delivered by the messaging gateway webhook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: String,
    pub from: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl InboundMessage {
    /// Message text, empty when absent
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Image media: `image` or any `image/*` MIME type, with a download URL
    pub fn is_image(&self) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|kind| kind.trim().to_ascii_lowercase().starts_with("image"))
            && self.media_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}
