//! Catat Web Server
//!
//! Axum-based HTTP surface for the Catat ledger bot.
//!
//! Routes:
//! - `POST /webhook`: inbound messages from the messaging gateway
//! - `/api/admin/*`: administrative REST API
//! - `GET /health`: liveness
//!
//! Security features:
//! - Webhook deliveries authenticated by HMAC signature or shared secret
//! - Admin API keys required by default (use --no-auth for local dev)
//! - Constant-time comparison for every secret
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use subtle::ConstantTimeEq;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use catat_core::{CancellationToken, Database, MessageRouter};

mod handlers;
mod scheduler;

pub use scheduler::{run_cleanup, start_cleanup_scheduler, CleanupReport, CleanupScheduleConfig};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Alternative header carrying an API key or the webhook secret
const API_KEY_HEADER: &str = "x-api-key";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether admin API keys are required (secure by default)
    pub require_auth: bool,
    /// API keys accepted on `/api/admin/*`
    /// Format: "Bearer <key>" in Authorization header, or X-Api-Key
    pub api_keys: Vec<String>,
    /// Shared secret for webhook deliveries; empty rejects every delivery
    pub webhook_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            api_keys: vec![],
            webhook_secret: String::new(),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub router: MessageRouter,
    pub config: ServerConfig,
    /// Parent of the cancellation tokens handed to message tasks
    pub shutdown: CancellationToken,
}

/// Admin authentication middleware - validates API keys
///
/// Keys are accepted from `Authorization: Bearer <key>` or `X-Api-Key` and
/// compared in constant time.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = provided_api_key(request.headers())
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(user = "api-key", path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// `Authorization: Bearer` token, if any
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
}

fn provided_api_key(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers).or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    })
}

/// Constant-time equality; an empty expected value never matches
pub(crate) fn secret_matches(provided: &str, expected: &str) -> bool {
    let provided_bytes = provided.as_bytes();
    let expected_bytes = expected.as_bytes();
    if expected_bytes.is_empty() || provided_bytes.len() != expected_bytes.len() {
        return false;
    }
    provided_bytes.ct_eq(expected_bytes).into()
}

/// Validate an API key against the configured keys
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    valid_keys.iter().any(|key| secret_matches(provided, key))
}

/// Identity recorded in the admin action log for REST calls
pub fn admin_identity(headers: &HeaderMap) -> String {
    if provided_api_key(headers).is_some() {
        "api-key".to_string()
    } else {
        "local-dev".to_string()
    }
}

/// Create the application router
pub fn create_router(router: MessageRouter, config: ServerConfig) -> Router {
    create_router_with_shutdown(router, config, CancellationToken::new())
}

/// Create the application router; cancelling `shutdown` cancels in-flight message tasks
pub fn create_router_with_shutdown(
    router: MessageRouter,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> Router {
    let state = Arc::new(AppState {
        db: router.db().clone(),
        router,
        config,
        shutdown,
    });

    let admin_routes = Router::new()
        .route("/users", get(handlers::list_users))
        .route("/users/:address", get(handlers::get_user_status))
        .route("/users/:address/upgrade", post(handlers::upgrade_user))
        .route("/users/:address/downgrade", post(handlers::downgrade_user))
        .route("/users/:address/block", post(handlers::block_user))
        .route("/users/:address/unblock", post(handlers::unblock_user))
        .route(
            "/users/:address/transactions",
            get(handlers::list_user_transactions),
        )
        .route("/users/:address/audit", get(handlers::list_user_audit))
        .route("/users/:address/report", get(handlers::get_user_report))
        .route("/actions", get(handlers::list_admin_actions))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhook", post(handlers::receive_webhook))
        .nest("/api/admin", admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
///
/// Runs until Ctrl+C; shutdown cancels pending extraction retries and the
/// cleanup scheduler.
pub async fn serve_with_config(
    router: MessageRouter,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Admin authentication disabled - do not expose to network!");
    }
    if config.webhook_secret.is_empty() {
        warn!("⚠️  WEBHOOK_SECRET not set - every webhook delivery will be rejected");
    }

    let shutdown = CancellationToken::new();

    if let Some(cleanup_config) = CleanupScheduleConfig::from_env() {
        start_cleanup_scheduler(router.db().clone(), cleanup_config, shutdown.clone());
    }

    let app = create_router_with_shutdown(router, config, shutdown.clone());
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
    shutdown.cancel();
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Keep client-facing detail for lookups and validation, hide the rest
    pub fn from_core(err: catat_core::Error) -> Self {
        match err {
            catat_core::Error::NotFound(msg) => Self::not_found(&msg),
            catat_core::Error::InvalidData(msg) => Self::bad_request(&msg),
            other => other.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
