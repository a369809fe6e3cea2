//! Messaging gateway client: outbound text and inbound media download
//!
//! # Configuration
//!
//! Environment variables:
//! - `GATEWAY_URL` (or `WHATSAPP_API_URL`): gateway base URL (required)
//! - `GATEWAY_SEND_PATH`: send endpoint path (default: /send/text)
//! - `GATEWAY_RECIPIENT_FIELD`: JSON field for the recipient (default: phone)
//! - `GATEWAY_MESSAGE_FIELD`: JSON field for the text (default: message)
//! - `GATEWAY_TOKEN` (or `WHATSAPP_API_TOKEN`): bearer token
//! - `GATEWAY_BASIC_USER` / `GATEWAY_BASIC_PASSWORD`: basic auth, used when no token is set

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};

/// Strip a JID suffix: `628123@s.whatsapp.net` -> `628123`
pub fn bare_address(address: &str) -> &str {
    address.split('@').next().unwrap_or(address).trim()
}

/// Outbound side of the chat gateway
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Deliver a text message to an address
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;

    /// Fetch the bytes behind an inbound media URL
    async fn download_media(&self, url: &str) -> Result<Vec<u8>>;
}

/// How requests to the gateway authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayAuth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

/// Gateway endpoint and payload shape
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub send_path: String,
    pub recipient_field: String,
    pub message_field: String,
    pub auth: GatewayAuth,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            send_path: "/send/text".to_string(),
            recipient_field: "phone".to_string(),
            message_field: "message".to_string(),
            auth: GatewayAuth::None,
            timeout: Duration::from_secs(15),
        }
    }

    /// Create from environment variables
    ///
    /// Returns None if no gateway URL is configured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("GATEWAY_URL")
            .or_else(|_| std::env::var("WHATSAPP_API_URL"))
            .ok()
            .filter(|s| !s.is_empty())?;

        let mut config = Self::new(&base_url);
        if let Ok(path) = std::env::var("GATEWAY_SEND_PATH") {
            config.send_path = path;
        }
        if let Ok(field) = std::env::var("GATEWAY_RECIPIENT_FIELD") {
            config.recipient_field = field;
        }
        if let Ok(field) = std::env::var("GATEWAY_MESSAGE_FIELD") {
            config.message_field = field;
        }

        let token = std::env::var("GATEWAY_TOKEN")
            .or_else(|_| std::env::var("WHATSAPP_API_TOKEN"))
            .ok()
            .filter(|s| !s.is_empty());
        let basic_user = std::env::var("GATEWAY_BASIC_USER").ok();

        config.auth = match (token, basic_user) {
            (Some(token), _) => GatewayAuth::Bearer(token),
            (None, Some(username)) => GatewayAuth::Basic {
                username,
                password: std::env::var("GATEWAY_BASIC_PASSWORD").unwrap_or_default(),
            },
            (None, None) => GatewayAuth::None,
        };

        Some(config)
    }
}

/// HTTP gateway client
#[derive(Clone)]
pub struct HttpGateway {
    http_client: Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.auth {
            GatewayAuth::None => req,
            GatewayAuth::Bearer(ref token) => req.bearer_auth(token),
            GatewayAuth::Basic {
                ref username,
                ref password,
            } => req.basic_auth(username, Some(password)),
        }
    }

    fn payload(&self, to: &str, text: &str) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            self.config.recipient_field.clone(),
            serde_json::Value::String(bare_address(to).to_string()),
        );
        body.insert(
            self.config.message_field.clone(),
            serde_json::Value::String(text.to_string()),
        );
        serde_json::Value::Object(body)
    }

    /// Resolve a media URL, allowing gateway-relative paths
    fn media_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.config.base_url, url)
        } else {
            url.to_string()
        }
    }

    /// Whether `url` points at the configured gateway host
    fn is_gateway_url(&self, url: &str) -> bool {
        let base = self.config.base_url.as_str();
        match url.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with(|c: char| c == '/' || c == '?'),
            None => false,
        }
    }
}

#[async_trait]
impl MessagingGateway for HttpGateway {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let url = format!("{}{}", self.config.base_url, self.config.send_path);
        let req = self.http_client.post(&url).json(&self.payload(to, text));
        let response = self.authorize(req).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Gateway(format!(
                "send failed with status {}: {}",
                status, body
            )));
        }

        debug!(to = bare_address(to), "Message sent");
        Ok(())
    }

    async fn download_media(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.media_url(url);
        let req = self.http_client.get(&url);
        // Gateway credentials never leave the gateway host
        let req = if self.is_gateway_url(&url) {
            self.authorize(req)
        } else {
            req
        };
        let response = req.send().await?;

        if !response.status().is_success() {
            return Err(Error::Gateway(format!(
                "media download failed with status {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// A message captured by `MockGateway`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub text: String,
}

/// In-memory gateway for tests: records sends, serves registered media
#[derive(Clone, Default)]
pub struct MockGateway {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    media: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `url`
    pub fn add_media(&self, url: &str, bytes: Vec<u8>) {
        if let Ok(mut media) = self.media.lock() {
            media.insert(url.to_string(), bytes);
        }
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Text of the most recent message
    pub fn last_text(&self) -> Option<String> {
        self.sent().last().map(|m| m.text.clone())
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl MessagingGateway for MockGateway {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| Error::Gateway("mock gateway lock poisoned".into()))?
            .push(SentMessage {
                to: bare_address(to).to_string(),
                text: text.to_string(),
            });
        Ok(())
    }

    async fn download_media(&self, url: &str) -> Result<Vec<u8>> {
        self.media
            .lock()
            .map_err(|_| Error::Gateway("mock gateway lock poisoned".into()))?
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Gateway(format!("no media at {}", url)))
    }
}

/// Concrete gateway enum, dispatching like `AIClient`
#[derive(Clone)]
pub enum Gateway {
    Http(HttpGateway),
    Mock(MockGateway),
}

impl Gateway {
    /// Create from environment variables (see module docs)
    pub fn from_env() -> Option<Self> {
        GatewayConfig::from_env().map(|config| Gateway::Http(HttpGateway::new(config)))
    }

    pub fn mock() -> Self {
        Gateway::Mock(MockGateway::new())
    }
}

#[async_trait]
impl MessagingGateway for Gateway {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        match self {
            Gateway::Http(g) => g.send_text(to, text).await,
            Gateway::Mock(g) => g.send_text(to, text).await,
        }
    }

    async fn download_media(&self, url: &str) -> Result<Vec<u8>> {
        match self {
            Gateway::Http(g) => g.download_media(url).await,
            Gateway::Mock(g) => g.download_media(url).await,
        }
    }
}
