//! Catat Core Library
//!
//! Shared functionality for the Catat conversational ledger:
//! - Database access and migrations (users, transactions, state, dedup, audit)
//! - Pluggable completion backends and the extraction gateway
//! - Confidence policy, quota decisions and the ledger service
//! - Conversation router and admin commands
//! - Messaging gateway client
//! - Report rollups

pub mod admin;
pub mod ai;
pub mod confidence;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod ledger;
pub mod messaging;
pub mod models;
pub mod quota;
pub mod report;
pub mod router;

/// Test utilities including mock provider and gateway servers
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use admin::{AdminCommand, AdminResponse};
pub use ai::{AIBackend, AIClient, CompletionRequest, MockBackend, OpenAICompatibleBackend};
pub use confidence::ConfidenceBand;
pub use config::LedgerConfig;
pub use db::{Database, NewAuditEntry};
pub use error::{Error, Result};
pub use extraction::{Extractor, RetryPolicy};
pub use ledger::{transaction_reference, Ledger};
pub use messaging::{
    bare_address, Gateway, GatewayAuth, GatewayConfig, HttpGateway, MessagingGateway, MockGateway,
};
pub use models::*;
pub use report::{ReportPeriod, ReportSummary};
pub use router::{MessageRouter, RouteOutcome};

/// Re-exported so callers can cancel in-flight extraction without a direct dependency
pub use tokio_util::sync::CancellationToken;
