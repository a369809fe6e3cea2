//! JSON parsing helpers for AI backend responses
//!
//! The response must be exactly one JSON object carrying every candidate
//! field. Prose, code fences or missing fields fail the attempt.

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::models::{CandidateTransaction, TransactionType};

use super::types::RawCandidate;

/// Truncate long responses for error messages
fn truncate(s: &str) -> String {
    if s.len() > 200 {
        let mut end = 200;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    } else {
        s.to_string()
    }
}

/// Parse and validate a candidate transaction
///
/// An unknown type, a negative or non-finite amount, or a confidence outside
/// `[0, 1]` is malformed. A present but unparseable date falls back to `today`.
pub fn parse_candidate(response: &str, today: NaiveDate) -> Result<CandidateTransaction> {
    let json_str = response.trim();
    let raw: RawCandidate = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid candidate JSON from AI: {} | Raw: {}",
            e,
            truncate(json_str)
        ))
    })?;

    let tx_type = match raw.tx_type.trim().to_uppercase().as_str() {
        "INCOME" => TransactionType::Income,
        "EXPENSE" => TransactionType::Expense,
        other => {
            return Err(Error::InvalidData(format!(
                "Unknown transaction type from AI: {}",
                other
            )))
        }
    };

    if !raw.amount.is_finite() || raw.amount < 0.0 {
        return Err(Error::InvalidData(format!(
            "Invalid amount from AI: {}",
            raw.amount
        )));
    }

    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(Error::InvalidData(format!(
            "Confidence out of range from AI: {}",
            raw.confidence
        )));
    }

    let date = NaiveDate::parse_from_str(raw.date.trim(), "%Y-%m-%d").unwrap_or(today);

    Ok(CandidateTransaction {
        tx_type,
        amount: raw.amount,
        category: raw.category.trim().to_string(),
        description: raw.description.trim().to_string(),
        date,
        confidence: raw.confidence,
    })
}
