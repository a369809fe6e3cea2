//! Test utilities for catat-core
//!
//! In-process HTTP servers standing in for the completion provider and the
//! messaging gateway, for integration tests and local development.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

async fn serve(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

/// Mock OpenAI-compatible server
///
/// Answers `/v1/chat/completions` with queued contents, falling back to a
/// candidate built from the first number in the last user message.
pub struct MockCompletionServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: Arc<CompletionState>,
}

#[derive(Default)]
struct CompletionState {
    queue: Mutex<VecDeque<(StatusCode, String)>>,
    requests: Mutex<Vec<Value>>,
}

impl MockCompletionServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = Arc::new(CompletionState::default());
        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_completion))
            .with_state(state.clone());

        let (addr, shutdown_tx) = serve(app).await;
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            state,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue the message content for the next completion
    pub fn push_content(&self, content: &str) {
        self.state
            .queue
            .lock()
            .unwrap()
            .push_back((StatusCode::OK, content.to_string()));
    }

    /// Make the next completion fail with `status`
    pub fn push_failure(&self, status: StatusCode) {
        self.state
            .queue
            .lock()
            .unwrap()
            .push_back((status, String::new()));
    }

    /// Request bodies received so far
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockCompletionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{ "id": "mock-model", "object": "model" }]
    }))
}

async fn handle_completion(
    State(state): State<Arc<CompletionState>>,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.requests.lock().unwrap().push(request.clone());

    let queued = state.queue.lock().unwrap().pop_front();
    let (status, content) = queued.unwrap_or_else(|| (StatusCode::OK, default_content(&request)));

    if !status.is_success() {
        return (status, Json(json!({ "error": { "message": "mock failure" } })));
    }

    (
        StatusCode::OK,
        Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": request["model"],
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })),
    )
}

/// Candidate JSON derived from the last user text
fn default_content(request: &Value) -> String {
    let user_text = request["messages"]
        .as_array()
        .and_then(|messages| messages.iter().rev().find(|m| m["role"] == "user"))
        .map(|m| match &m["content"] {
            Value::String(text) => text.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        })
        .unwrap_or_default();

    let amount: f64 = user_text
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);

    json!({
        "type": "EXPENSE",
        "amount": amount,
        "category": "lainnya",
        "description": user_text.trim(),
        "date": "",
        "confidence": if amount > 0.0 { 0.9 } else { 0.1 },
    })
    .to_string()
}

/// Mock messaging gateway server
///
/// Records `POST /send/text` bodies and serves registered media under `/media/{name}`.
pub struct MockGatewayServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: Arc<GatewayState>,
}

#[derive(Default)]
struct GatewayState {
    sent: Mutex<Vec<Value>>,
    auth_headers: Mutex<Vec<Option<String>>>,
    media_auth_headers: Mutex<Vec<Option<String>>>,
    media: Mutex<HashMap<String, Vec<u8>>>,
    fail_sends: Mutex<bool>,
}

impl MockGatewayServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = Arc::new(GatewayState::default());
        let app = Router::new()
            .route("/send/text", post(handle_send))
            .route("/media/:name", get(handle_media))
            .with_state(state.clone());

        let (addr, shutdown_tx) = serve(app).await;
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            state,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Register media; returns its absolute URL
    pub fn add_media(&self, name: &str, bytes: Vec<u8>) -> String {
        self.state
            .media
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes);
        format!("{}/media/{}", self.url(), name)
    }

    /// Answer sends with 500 from now on
    pub fn fail_sends(&self, fail: bool) {
        *self.state.fail_sends.lock().unwrap() = fail;
    }

    /// JSON bodies of accepted sends
    pub fn sent(&self) -> Vec<Value> {
        self.state.sent.lock().unwrap().clone()
    }

    /// `Authorization` header of every send attempt
    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.state.auth_headers.lock().unwrap().clone()
    }

    /// `Authorization` header of every media download
    pub fn media_auth_headers(&self) -> Vec<Option<String>> {
        self.state.media_auth_headers.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockGatewayServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn authorization(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn handle_send(
    State(state): State<Arc<GatewayState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.auth_headers.lock().unwrap().push(authorization(&headers));

    if *state.fail_sends.lock().unwrap() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "code": "ERROR", "message": "device offline" })),
        );
    }

    state.sent.lock().unwrap().push(body);
    (
        StatusCode::OK,
        Json(json!({ "code": "SUCCESS", "message": "Success" })),
    )
}

async fn handle_media(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Vec<u8>, StatusCode> {
    state
        .media_auth_headers
        .lock()
        .unwrap()
        .push(authorization(&headers));
    state
        .media
        .lock()
        .unwrap()
        .get(&name)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_completion_server_starts() {
        let server = MockCompletionServer::start().await;
        let response = reqwest::get(format!("{}/v1/models", server.url()))
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    #[test]
    fn test_default_content_reads_last_user_message() {
        let request = json!({
            "messages": [
                { "role": "system", "content": "rules 123" },
                { "role": "user", "content": "beli kopi 20000" }
            ]
        });
        let content: Value = serde_json::from_str(&default_content(&request)).unwrap();
        assert_eq!(content["amount"], 20000.0);
        assert_eq!(content["confidence"], 0.9);
    }
}
