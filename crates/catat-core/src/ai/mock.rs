//! Mock backend for testing
//!
//! Replays scripted responses in order; once the script is exhausted it falls
//! back to a keyword heuristic over the user prompt. Useful for unit tests and
//! development without a completion provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::CompletionRequest;
use super::AIBackend;

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    script: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Default::default()
        }
    }

    /// Queue a raw model response
    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(response.into()));
        }
    }

    /// Queue a transport failure
    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(Error::InvalidData(message.into())));
        }
    }

    /// Number of completion calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Keyword heuristic used when nothing is scripted
    fn heuristic(request: &CompletionRequest) -> String {
        if request.image.is_some() {
            return r#"{"type":"EXPENSE","amount":25000,"category":"belanja","description":"Struk belanja","date":"","confidence":0.85}"#
                .to_string();
        }

        let text = request.prompt.to_lowercase();
        let amount: Option<f64> = text
            .split(|c: char| !c.is_ascii_digit())
            .find(|s| !s.is_empty())
            .and_then(|s| s.parse().ok());

        let Some(amount) = amount else {
            return r#"{"type":"EXPENSE","amount":0,"category":"","description":"","date":"","confidence":0.1}"#
                .to_string();
        };

        let income = ["gaji", "dapat", "terima", "pemasukan", "jual"]
            .iter()
            .any(|kw| text.contains(kw));
        let category = if text.contains("gaji") {
            "gaji"
        } else if ["bensin", "ojek", "parkir", "tol"]
            .iter()
            .any(|kw| text.contains(kw))
        {
            "transport"
        } else if ["makan", "kopi", "minum"].iter().any(|kw| text.contains(kw)) {
            "makan"
        } else {
            "lainnya"
        };

        serde_json::json!({
            "type": if income { "INCOME" } else { "EXPENSE" },
            "amount": amount,
            "category": category,
            "description": request.prompt.trim(),
            "date": "",
            "confidence": 0.9,
        })
        .to_string()
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .script
            .lock()
            .map_err(|_| Error::InvalidData("Mock script lock poisoned".into()))?
            .pop_front();

        match scripted {
            Some(result) => result,
            None => Ok(Self::heuristic(request)),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scripted_then_heuristic() {
        let mock = MockBackend::new();
        mock.push_error("connection reset");
        mock.push_response("{}");

        let req = CompletionRequest::text("system", "beli bensin 50000");
        assert!(mock.complete(&req).await.is_err());
        assert_eq!(mock.complete(&req).await.unwrap(), "{}");

        let fallback = mock.complete(&req).await.unwrap();
        assert!(fallback.contains("\"EXPENSE\""));
        assert!(fallback.contains("transport"));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_heuristic_income() {
        let mock = MockBackend::new();
        let req = CompletionRequest::text("system", "terima gaji 20000000");
        let out = mock.complete(&req).await.unwrap();
        assert!(out.contains("\"INCOME\""));
        assert!(out.contains("20000000"));
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        assert!(MockBackend::new().health_check().await);
        assert!(!MockBackend::unhealthy().health_check().await);
    }
}
