//! Extraction gateway: turns chat text or a receipt photo into a candidate transaction
//!
//! Wraps the completion provider with bounded retry. Each attempt must yield a
//! strict, valid candidate; anything else counts as a failed attempt.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, Utc};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ai::parsing::parse_candidate;
use crate::ai::{AIBackend, AIClient, CompletionRequest};
use crate::error::{Error, Result};
use crate::models::CandidateTransaction;

/// Bounded retry with linear back-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait before attempt `n + 1` is `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }
}

/// Run `op` until it succeeds or the policy is exhausted
///
/// `op` receives the 1-based attempt number. Cancelling `cancel` aborts a
/// pending back-off wait with `Error::Cancelled`; an attempt already in flight
/// is not interrupted.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = policy.base_delay * (attempt - 1);
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "Extraction attempt failed");
                last_error = e.to_string();
            }
        }
    }

    Err(Error::Extraction {
        attempts: max_attempts,
        last: last_error,
    })
}

fn ribu_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s*(?:ribu|rb)").expect("valid regex"))
}

fn juta_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s*(?:juta|jt)").expect("valid regex"))
}

fn amount_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\s*(?:rb|ribu|jt|juta|rupiah|rp)").expect("valid regex"))
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

fn scale(re: &Regex, text: &str, factor: u64) -> String {
    re.replace_all(text, |caps: &regex::Captures| {
        match caps[1].parse::<u64>().ok().and_then(|n| n.checked_mul(factor)) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

/// Expand Indonesian magnitude shorthand: `50rb` -> `50000`, `20 juta` -> `20000000`
pub fn normalize_amount(text: &str) -> String {
    let text = scale(ribu_re(), text, 1_000);
    scale(juta_re(), &text, 1_000_000)
}

/// Parse a user-typed amount such as `75rb`, `Rp 12.500` or `1500000`
pub fn parse_amount(text: &str) -> Option<f64> {
    let normalized = normalize_amount(&text.to_lowercase());
    let digits: String = normalized
        .trim()
        .trim_start_matches("rp")
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | ' '))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

const RECORD_KEYWORDS: &[&str] = &["catat", "pencatatan", "simpan", "record"];

const TRANSACTION_KEYWORDS: &[&str] = &[
    "beli",
    "bayar",
    "dapat",
    "terima",
    "gaji",
    "pemasukan",
    "pengeluaran",
    "belanja",
];

/// Whether a free-form message looks like a transaction worth extracting
///
/// True for an explicit recording keyword, a number next to a money token
/// (`50rb`, `2 juta`, `10000 rupiah`), or a transaction keyword alongside digits.
pub fn should_trigger_parsing(message: &str) -> bool {
    let message = message.to_lowercase();

    if RECORD_KEYWORDS.iter().any(|kw| message.contains(kw)) {
        return true;
    }

    if amount_token_re().is_match(&message) {
        return true;
    }

    digits_re().is_match(&message) && TRANSACTION_KEYWORDS.iter().any(|kw| message.contains(kw))
}

/// System prompt for text extraction
pub fn text_prompt(today: NaiveDate) -> String {
    let today = today.format("%Y-%m-%d");
    format!(
        r#"You are a financial transaction parser for Indonesian users.
Parse the message into a structured transaction.

IMPORTANT: Today's date is {today}. Use this as the default date if no date is mentioned.

Rules:
1. Determine if it's INCOME or EXPENSE
2. Extract the amount (handle "rb" = ribu/1000, "jt" = juta/1000000)
3. Identify category (e.g., "gaji", "makan", "transport", "belanja")
4. Extract description
5. Parse date if mentioned, otherwise use TODAY ({today})
6. Provide confidence score (0.0-1.0)

Return ONLY valid JSON in this exact format:
{{
  "type": "INCOME" or "EXPENSE",
  "amount": number,
  "category": "string",
  "description": "string",
  "date": "YYYY-MM-DD",
  "confidence": 0.0-1.0
}}

Examples:
- "catat pemasukan 10000 gaji" -> INCOME, 10000, "gaji", "gaji", {today}, 0.95
- "beli bensin 50rb" -> EXPENSE, 50000, "transport", "beli bensin", {today}, 0.9
- "dapat uang dari jual motor 20 juta" -> INCOME, 20000000, "penjualan", "jual motor", {today}, 0.85"#
    )
}

/// Instruction for receipt / transfer screenshot extraction
pub fn image_prompt(today: NaiveDate) -> String {
    format!(
        r#"You are a receipt/transaction image parser for Indonesian financial transactions.
Extract transaction information from the image (receipt, bank transfer screenshot, etc).
Today's date is {}.

Return ONLY valid JSON in this exact format:
{{
  "type": "INCOME" or "EXPENSE",
  "amount": number,
  "category": "string",
  "description": "string (merchant name or transfer description)",
  "date": "YYYY-MM-DD",
  "confidence": 0.0-1.0
}}

Rules:
1. For receipts -> EXPENSE, extract total amount and merchant name
2. For transfer screenshots -> check if incoming (INCOME) or outgoing (EXPENSE)
3. Extract date from image, use today if not visible
4. Provide high confidence (>0.8) only if amount and type are clear
5. If image is unclear or not a transaction, return confidence < 0.4"#,
        today.format("%Y-%m-%d")
    )
}

/// Extraction gateway over an AI client
#[derive(Clone)]
pub struct Extractor {
    ai: AIClient,
    retry: RetryPolicy,
    utc_offset: FixedOffset,
}

impl Extractor {
    pub fn new(ai: AIClient, retry: RetryPolicy, utc_offset: FixedOffset) -> Self {
        Self {
            ai,
            retry,
            utc_offset,
        }
    }

    /// Model identifier stored with each recorded transaction
    pub fn model_version(&self) -> &str {
        self.ai.model()
    }

    pub fn client(&self) -> &AIClient {
        &self.ai
    }

    /// Current calendar date in the configured offset
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.utc_offset).date_naive()
    }

    /// Extract a candidate from chat text
    pub async fn extract_text(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<CandidateTransaction> {
        let today = self.today();
        let normalized = normalize_amount(text);
        debug!(original = %text, normalized = %normalized, "Extracting from text");

        let request = CompletionRequest::text(text_prompt(today), normalized);
        self.run(&request, today, cancel).await
    }

    /// Extract a candidate from a receipt or transfer screenshot
    pub async fn extract_image(
        &self,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> Result<CandidateTransaction> {
        let today = self.today();
        debug!(bytes = image.len(), "Extracting from image");

        let request = CompletionRequest::vision(image_prompt(today), image.to_vec());
        self.run(&request, today, cancel).await
    }

    async fn run(
        &self,
        request: &CompletionRequest,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<CandidateTransaction> {
        with_retry(self.retry, cancel, |_attempt| async move {
            let response = self.ai.complete(request).await?;
            parse_candidate(&response, today)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::models::TransactionType;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn wib() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount("beli bensin 50rb"), "beli bensin 50000");
        assert_eq!(normalize_amount("dapat 20 juta"), "dapat 20000000");
        assert_eq!(normalize_amount("makan 15 ribu"), "makan 15000");
        assert_eq!(normalize_amount("gaji 5jt"), "gaji 5000000");
        assert_eq!(normalize_amount("tanpa angka"), "tanpa angka");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("75rb"), Some(75_000.0));
        assert_eq!(parse_amount("Rp 12.500"), Some(12_500.0));
        assert_eq!(parse_amount("1500000"), Some(1_500_000.0));
        assert_eq!(parse_amount("banyak"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_should_trigger_parsing() {
        assert!(should_trigger_parsing("catat pemasukan 10000 gaji"));
        assert!(should_trigger_parsing("tolong simpan ya"));
        assert!(should_trigger_parsing("bensin 50rb"));
        assert!(should_trigger_parsing("10000 rupiah"));
        assert!(should_trigger_parsing("beli kopi 20000"));
        assert!(!should_trigger_parsing("beli kopi"));
        assert!(!should_trigger_parsing("halo 123"));
        assert!(!should_trigger_parsing("apa kabar"));
    }

    #[test]
    fn test_prompt_carries_today() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert!(text_prompt(today).contains("Today's date is 2025-01-31"));
        assert!(image_prompt(today).contains("2025-01-31"));
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = with_retry(RetryPolicy::immediate(3), &cancel, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(Error::InvalidData("flaky".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhaustion_names_last_error() {
        let cancel = CancellationToken::new();
        let result: Result<()> = with_retry(RetryPolicy::immediate(2), &cancel, |attempt| async move {
            Err(Error::InvalidData(format!("boom {}", attempt)))
        })
        .await;
        match result {
            Err(Error::Extraction { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(last.contains("boom 2"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_with_retry_cancel_aborts_wait() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(3600),
        };
        let start = std::time::Instant::now();
        let result: Result<()> =
            with_retry(policy, &cancel, |_| async { Err(Error::InvalidData("x".into())) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_extract_text_normalizes_before_sending() {
        let mock = MockBackend::new();
        let extractor = Extractor::new(
            AIClient::Mock(mock.clone()),
            RetryPolicy::immediate(1),
            wib(),
        );
        let cancel = CancellationToken::new();

        let candidate = extractor
            .extract_text("beli bensin 50rb", &cancel)
            .await
            .unwrap();
        assert_eq!(candidate.amount, 50_000.0);
        assert_eq!(candidate.tx_type, TransactionType::Expense);
        assert_eq!(candidate.date, extractor.today());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_retries_malformed_output() {
        let mock = MockBackend::new();
        mock.push_response("maaf, saya tidak mengerti");
        mock.push_response(r#"{"type":"EXPENSE","amount":-1,"confidence":0.9}"#);
        mock.push_response(
            r#"{"type":"INCOME","amount":20000000,"category":"penjualan","description":"jual motor","date":"2025-02-01","confidence":0.85}"#,
        );
        let extractor = Extractor::new(
            AIClient::Mock(mock.clone()),
            RetryPolicy::immediate(3),
            wib(),
        );

        let candidate = extractor
            .extract_text("dapat uang dari jual motor 20 juta", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(candidate.amount, 20_000_000.0);
        assert_eq!(candidate.tx_type, TransactionType::Income);
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_extract_image_uses_vision_request() {
        let extractor = Extractor::new(AIClient::mock(), RetryPolicy::immediate(1), wib());
        let candidate = extractor
            .extract_image(&[0xff, 0xd8, 0xff], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(candidate.tx_type, TransactionType::Expense);
        assert_eq!(candidate.description, "Struk belanja");
    }
}
