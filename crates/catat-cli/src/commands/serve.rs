//! Server command implementation

use std::path::Path;

use anyhow::Result;
use catat_core::{AIBackend, AIClient, Gateway, LedgerConfig, MessageRouter};

use super::open_db;

/// Split a comma-separated environment variable into trimmed, non-empty values
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    println!("🚀 Starting Catat webhook server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    let Some(ai) = AIClient::from_env() else {
        anyhow::bail!(
            "No completion provider configured. Set OPENAI_COMPATIBLE_HOST (or AI_BACKEND=mock for development)"
        );
    };
    let Some(gateway) = Gateway::from_env() else {
        anyhow::bail!("No messaging gateway configured. Set GATEWAY_URL");
    };

    // Parse API keys from environment (comma-separated)
    let api_keys = parse_list(&std::env::var("CATAT_API_KEYS").unwrap_or_default());
    let webhook_secret = std::env::var("WEBHOOK_SECRET").unwrap_or_default();
    let ledger_config = LedgerConfig::from_env();

    if ai.health_check().await {
        println!("   ✅ Completion provider: {} (model: {})", ai.host(), ai.model());
    } else {
        println!(
            "   ⚠️  Completion provider configured but not responding: {}",
            ai.host()
        );
    }

    println!(
        "   Free limit: {} transactions, undo window: {}s",
        ledger_config.free_limit,
        ledger_config.undo_window.num_seconds()
    );
    match &ledger_config.admin_address {
        Some(admin) => println!("   👤 Admin: {}", admin),
        None => println!("   ⚠️  ADMIN_MSISDN not set - chat admin commands disabled"),
    }

    if webhook_secret.is_empty() {
        println!("   ❌ WEBHOOK_SECRET not set - every webhook delivery will be rejected");
    } else {
        println!("   🔐 Webhook: shared secret / HMAC signature");
    }

    if no_auth {
        println!();
        println!("   ⚠️  Admin API authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!("   🔒 Admin API: no keys configured (CATAT_API_KEYS), all requests rejected");
    } else {
        println!(
            "   🔑 Admin API keys: {} configured (CATAT_API_KEYS)",
            api_keys.len()
        );
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;
    let router = MessageRouter::new(db, ai, gateway, ledger_config);

    let config = catat_server::ServerConfig {
        require_auth: !no_auth,
        api_keys,
        webhook_secret,
    };

    catat_server::serve_with_config(router, host, port, config).await?;

    Ok(())
}
