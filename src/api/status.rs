//! Student status, audit history, and leaderboard endpoints
//!
//! All balances surface through the reconciliation service; nothing here
//! reads the cached fields directly.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::activity::ActivityGate;
use crate::api::error_response;
use crate::database::DatabasePool;
use crate::error::LedgerError;
use crate::ledger::{LeaderboardEntry, LeaderboardScope, ReconciliationService};

#[derive(Clone)]
pub struct StatusApiState {
    pub db: Arc<DatabasePool>,
    pub reconciliation: Arc<ReconciliationService>,
    pub gate: Arc<ActivityGate>,
}

#[derive(Debug, Serialize)]
pub struct StudentStatusResponse {
    pub student_id: String,
    pub total_xp: i64,
    pub monthly_xp: i64,
    pub global_xp: i64,
    pub trust_tier: String,
    pub approval_streak: i32,
    pub rejection_count: i32,
    pub activity_streak: u32,
}

#[derive(Debug, Serialize)]
pub struct TransactionSummary {
    pub id: i64,
    pub amount: i64,
    pub tx_type: String,
    pub reason: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub student_id: String,
    pub transactions: Vec<TransactionSummary>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub scope: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub scope: LeaderboardScope,
    pub entries: Vec<LeaderboardEntry>,
}

/// GET /students/{student_id}/status - reconciled balances plus trust
/// and streak state
pub async fn student_status(
    State(state): State<StatusApiState>,
    Path(student_id): Path<String>,
) -> Result<Json<StudentStatusResponse>, (StatusCode, String)> {
    let student = state
        .db
        .students()
        .get(&student_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(LedgerError::not_found("student", &student_id)))?;

    let total_xp = state
        .reconciliation
        .lifetime_xp(&student_id)
        .await
        .map_err(error_response)?;
    let monthly_xp = state
        .reconciliation
        .monthly_xp(&student_id)
        .await
        .map_err(error_response)?;
    let global_xp = state
        .reconciliation
        .global_xp(&student_id)
        .await
        .map_err(error_response)?;
    let activity_streak = state.gate.streak(&student_id).await.map_err(error_response)?;

    Ok(Json(StudentStatusResponse {
        student_id,
        total_xp,
        monthly_xp,
        global_xp,
        trust_tier: student.trust_tier.as_str().to_string(),
        approval_streak: student.approval_streak,
        rejection_count: student.rejection_count,
        activity_streak,
    }))
}

/// GET /students/{student_id}/transactions - recent audit-log rows
pub async fn student_transactions(
    State(state): State<StatusApiState>,
    Path(student_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, (StatusCode, String)> {
    if state
        .db
        .students()
        .get(&student_id)
        .await
        .map_err(error_response)?
        .is_none()
    {
        return Err(error_response(LedgerError::not_found("student", &student_id)));
    }

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let transactions = state
        .db
        .transactions()
        .history(&student_id, limit)
        .await
        .map_err(error_response)?;

    Ok(Json(TransactionsResponse {
        student_id,
        transactions: transactions
            .into_iter()
            .map(|t| TransactionSummary {
                id: t.id,
                amount: t.amount,
                tx_type: t.tx_type.as_str().to_string(),
                reason: t.reason,
                created_at: t.created_at.to_rfc3339(),
            })
            .collect(),
    }))
}

/// GET /leaderboard?scope=monthly|lifetime|global - computed on read
pub async fn leaderboard(
    State(state): State<StatusApiState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, (StatusCode, String)> {
    let scope = match query.scope.as_deref() {
        None => LeaderboardScope::Monthly,
        Some(s) => LeaderboardScope::parse(s).ok_or_else(|| {
            error_response(LedgerError::Validation(format!(
                "unknown leaderboard scope: {}",
                s
            )))
        })?,
    };

    let entries = state
        .reconciliation
        .leaderboard(scope, query.limit.unwrap_or(25))
        .await
        .map_err(error_response)?;

    Ok(Json(LeaderboardResponse { scope, entries }))
}

/// Create the status API router
pub fn create_router(state: StatusApiState) -> Router {
    Router::new()
        .route("/students/{student_id}/status", get(student_status))
        .route("/students/{student_id}/transactions", get(student_transactions))
        .route("/leaderboard", get(leaderboard))
        .with_state(state)
}
