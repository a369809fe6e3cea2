//! Extraction dry run against the configured completion provider

use std::path::Path;

use anyhow::{Context, Result};
use catat_core::extraction::{normalize_amount, should_trigger_parsing};
use catat_core::report::format_rupiah;
use catat_core::{
    AIBackend, AIClient, CancellationToken, CandidateTransaction, ConfidenceBand, Extractor,
    LedgerConfig, RetryPolicy,
};
use tracing::debug;

/// Run one extraction without touching the database
pub async fn extract_candidate(
    ai: AIClient,
    retry: RetryPolicy,
    config: &LedgerConfig,
    text: Option<&str>,
    image: Option<&Path>,
) -> Result<(CandidateTransaction, ConfidenceBand)> {
    let extractor = Extractor::new(ai, retry, config.utc_offset);
    let cancel = CancellationToken::new();

    let candidate = match (text, image) {
        (_, Some(path)) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read image: {}", path.display()))?;
            extractor.extract_image(&bytes, &cancel).await?
        }
        (Some(text), None) => extractor.extract_text(text, &cancel).await?,
        (None, None) => anyhow::bail!("Provide message text or --image <path>"),
    };

    let band = ConfidenceBand::classify(candidate.confidence);
    debug!(confidence = candidate.confidence, ?band, "Classified candidate");
    Ok((candidate, band))
}

pub async fn cmd_parse(text: Option<&str>, image: Option<&Path>) -> Result<()> {
    let Some(ai) = AIClient::from_env() else {
        anyhow::bail!(
            "No completion provider configured. Set OPENAI_COMPATIBLE_HOST (or AI_BACKEND=mock)"
        );
    };

    if !ai.health_check().await {
        anyhow::bail!("Completion provider not responding: {}", ai.host());
    }

    println!();
    println!("🔎 Extraction ({} via {})", ai.model(), ai.host());
    println!("   ─────────────────────────────────────────────────────────────");

    if let (Some(text), None) = (text, image) {
        println!("   Input:      {}", text);
        println!("   Normalized: {}", normalize_amount(text));
        if !should_trigger_parsing(text) {
            println!("   ⚠️  Chat would not treat this message as a transaction");
        }
    }

    let config = LedgerConfig::from_env();
    let (candidate, band) = extract_candidate(ai, config.retry, &config, text, image).await?;

    println!("   Type:        {}", candidate.tx_type);
    println!("   Amount:      {}", format_rupiah(candidate.amount));
    println!("   Category:    {}", candidate.category);
    println!("   Description: {}", candidate.description);
    println!("   Date:        {}", candidate.date);
    println!("   Confidence:  {:.2}", candidate.confidence);

    let verdict = match band {
        ConfidenceBand::Accept => "✅ recorded immediately",
        ConfidenceBand::Confirm => "❓ user asked to confirm",
        ConfidenceBand::Reject => "❌ rejected, user asked to rephrase",
    };
    println!("   Outcome:     {}", verdict);

    Ok(())
}
