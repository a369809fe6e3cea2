//! Shared types for AI backend requests and responses

use serde::Deserialize;

/// A single completion call
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// System instructions, sent as a separate message when present
    pub system: Option<String>,
    /// User content
    pub prompt: String,
    /// Image bytes for vision requests (sent as a JPEG data URL)
    pub image: Option<Vec<u8>>,
    /// Ask the provider for a JSON object response
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn text(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            prompt: prompt.into(),
            image: None,
            json_mode: true,
        }
    }

    pub fn vision(prompt: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            image: Some(image),
            json_mode: true,
        }
    }
}

/// Candidate transaction as emitted by the model, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct RawCandidate {
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: f64,
    pub category: String,
    pub description: String,
    pub date: String,
    pub confidence: f64,
}
