//! Inbound webhook from the messaging gateway
//!
//! A delivery is authenticated by `X-Hub-Signature-256: sha256=<hex>` (HMAC-SHA256
//! of the raw body) when that header is present, otherwise by the shared secret
//! in `X-Webhook-Secret`, `X-Api-Key` or `Authorization: Bearer`. Accepted
//! messages are processed on their own task; the response does not wait.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::{bearer_token, secret_matches, AppError, AppState};
use catat_core::InboundMessage;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SECRET_HEADER: &str = "x-webhook-secret";
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Check a delivery against the configured secret
pub fn verify_webhook(headers: &HeaderMap, body: &[u8], secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    if let Some(signature) = header_str(headers, SIGNATURE_HEADER) {
        return verify_signature(signature, body, secret);
    }

    [
        header_str(headers, SECRET_HEADER),
        header_str(headers, API_KEY_HEADER),
        bearer_token(headers),
    ]
    .into_iter()
    .flatten()
    .any(|provided| secret_matches(provided, secret))
}

fn verify_signature(header: &str, body: &[u8], secret: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `sha256=<hex>` signature for `body`
pub fn sign_body(body: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// POST /webhook - Accept one inbound message
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    if !verify_webhook(&headers, &body, &state.config.webhook_secret) {
        warn!("Rejected webhook delivery with invalid credentials");
        return Err(AppError::unauthorized("Invalid webhook credentials"));
    }

    let message: InboundMessage = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, "Malformed webhook payload");
        AppError::bad_request("Invalid payload")
    })?;

    if message.message_id.trim().is_empty() || message.from.trim().is_empty() {
        return Err(AppError::bad_request("message_id and from are required"));
    }

    let router = state.router.clone();
    let cancel = state.shutdown.child_token();
    tokio::spawn(async move {
        if let Err(e) = router.handle(&message, &cancel).await {
            debug!(message_id = %message.message_id, error = %e, "Message task ended with error");
        }
    });

    Ok(Json(WebhookAck { status: "accepted" }))
}
