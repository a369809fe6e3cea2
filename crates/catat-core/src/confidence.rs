//! Confidence bands for extraction results

/// Below this, a candidate is rejected
pub const REJECT_BELOW: f64 = 0.4;

/// At or above this, a candidate is recorded without asking
pub const ACCEPT_FROM: f64 = 0.7;

/// What to do with a candidate of a given confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    /// Ask the user to rephrase
    Reject,
    /// Ask the user to approve before recording
    Confirm,
    /// Record immediately
    Accept,
}

impl ConfidenceBand {
    pub fn classify(confidence: f64) -> Self {
        if confidence < REJECT_BELOW {
            Self::Reject
        } else if confidence < ACCEPT_FROM {
            Self::Confirm
        } else {
            Self::Accept
        }
    }
}
