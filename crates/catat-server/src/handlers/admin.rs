//! Administrative REST handlers
//!
//! Thin wrappers over `catat_core::admin`, so chat commands, the CLI and this
//! API share validation and the admin action log.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{admin_identity, AppError, AppState, MAX_PAGE_LIMIT};
use catat_core::admin;
use catat_core::quota::{is_premium_active, remaining_free};
use catat_core::report::generate_report;
use catat_core::{
    AdminAction, AuditEntry, MessagingGateway, ReportPeriod, ReportSummary, Transaction, User,
};

/// Query parameters for paginated lists
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

fn clamp_limit(limit: i64) -> i64 {
    limit.max(1).min(MAX_PAGE_LIMIT)
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub total: i64,
}

/// GET /api/admin/users - List users, newest first
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageQuery>,
) -> Result<Json<UserList>, AppError> {
    let users = state
        .db
        .list_users(clamp_limit(params.limit), params.offset.max(0))?;
    let total = state.db.count_users()?;
    Ok(Json(UserList { users, total }))
}

#[derive(Debug, Serialize)]
pub struct UserStatus {
    #[serde(flatten)]
    pub user: User,
    pub premium_active: bool,
    /// Free transactions left; absent while premium is active
    pub remaining_free: Option<i64>,
    pub live_transactions: i64,
}

/// GET /api/admin/users/:address - Plan, quota and block status
pub async fn get_user_status(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<UserStatus>, AppError> {
    let user = admin::user_status(&state.db, &address).map_err(AppError::from_core)?;
    let now = Utc::now();
    let free_limit = state.router.config().free_limit;
    let live_transactions = state.db.count_live_transactions(user.id)?;

    Ok(Json(UserStatus {
        premium_active: is_premium_active(&user, now),
        remaining_free: remaining_free(&user, free_limit, now),
        live_transactions,
        user,
    }))
}

/// Body for an upgrade
#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    /// Defaults to today in the configured offset
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_months")]
    pub months: u32,
}

fn default_months() -> u32 {
    1
}

/// POST /api/admin/users/:address/upgrade - Activate premium
pub async fn upgrade_user(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpgradeRequest>,
) -> Result<Json<User>, AppError> {
    let admin_id = admin_identity(&headers);
    let start = body.start_date.unwrap_or_else(|| {
        Utc::now()
            .with_timezone(&state.router.config().utc_offset)
            .date_naive()
    });

    let user = admin::upgrade_user(&state.db, &admin_id, &address, start, body.months)
        .map_err(AppError::from_core)?;

    if let Err(e) = state
        .router
        .gateway()
        .send_text(&user.address, admin::UPGRADE_NOTICE)
        .await
    {
        warn!(address = %user.address, error = %e, "Failed to notify upgraded user");
    }

    Ok(Json(user))
}

/// POST /api/admin/users/:address/downgrade - Return to the free plan
pub async fn downgrade_user(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let user = admin::downgrade_user(&state.db, &admin_identity(&headers), &address)
        .map_err(AppError::from_core)?;
    Ok(Json(user))
}

/// POST /api/admin/users/:address/block
pub async fn block_user(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let user = admin::set_user_blocked(&state.db, &admin_identity(&headers), &address, true)
        .map_err(AppError::from_core)?;
    Ok(Json(user))
}

/// POST /api/admin/users/:address/unblock
pub async fn unblock_user(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let user = admin::set_user_blocked(&state.db, &admin_identity(&headers), &address, false)
        .map_err(AppError::from_core)?;
    Ok(Json(user))
}

/// GET /api/admin/users/:address/transactions - Most recent live transactions
pub async fn list_user_transactions(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user = admin::user_status(&state.db, &address).map_err(AppError::from_core)?;
    let transactions = state
        .db
        .list_transactions(user.id, clamp_limit(params.limit))?;
    Ok(Json(transactions))
}

/// GET /api/admin/users/:address/audit - Audit trail for one user
pub async fn list_user_audit(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let user = admin::user_status(&state.db, &address).map_err(AppError::from_core)?;
    let entries = state
        .db
        .list_audit_log(Some(user.id), clamp_limit(params.limit))?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// today, week or month (default: month)
    pub period: Option<String>,
}

/// GET /api/admin/users/:address/report - Totals for the current period
pub async fn get_user_report(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<ReportQuery>,
) -> Result<Json<ReportSummary>, AppError> {
    let period: ReportPeriod = match params.period.as_deref() {
        Some(raw) => raw.parse().map_err(|e: String| AppError::bad_request(&e))?,
        None => ReportPeriod::ThisMonth,
    };
    let user = admin::user_status(&state.db, &address).map_err(AppError::from_core)?;
    let (start, end) = period.current_range(state.router.config().utc_offset);
    let summary = generate_report(&state.db, user.id, start, end)?;
    Ok(Json(summary))
}

/// GET /api/admin/actions - Admin action log, newest first
pub async fn list_admin_actions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Vec<AdminAction>>, AppError> {
    let actions = state.db.list_admin_actions(clamp_limit(params.limit))?;
    Ok(Json(actions))
}
