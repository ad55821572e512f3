//! Video submission and decision endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error_response;
use crate::moderation::{ModerationEngine, ReviewDecision, VideoSubmission, VideoSubmissionRequest};

#[derive(Clone)]
pub struct VideoApiState {
    pub engine: Arc<ModerationEngine>,
}

#[derive(Debug, Serialize)]
pub struct VideoSubmissionResponse {
    pub id: Uuid,
    pub student_id: String,
    pub challenge_id: String,
    pub status: String,
    pub ai_flag: String,
    pub ai_flag_reason: Option<String>,
    pub is_spot_check: bool,
    pub xp_value: i64,
    pub xp_awarded: i64,
    pub notes: Option<String>,
    pub created_at: String,
    pub decided_at: Option<String>,
}

impl From<VideoSubmission> for VideoSubmissionResponse {
    fn from(sub: VideoSubmission) -> Self {
        Self {
            id: sub.id,
            student_id: sub.student_id,
            challenge_id: sub.challenge_id,
            status: sub.status.as_str().to_string(),
            ai_flag: sub.ai_flag.as_str().to_string(),
            ai_flag_reason: sub.ai_flag_reason,
            is_spot_check: sub.is_spot_check,
            xp_value: sub.xp_value,
            xp_awarded: sub.xp_awarded,
            notes: sub.notes,
            created_at: sub.created_at.to_rfc3339(),
            decided_at: sub.decided_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: ReviewDecision,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub submission: VideoSubmissionResponse,
    pub xp_applied: i64,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub total: usize,
    pub submissions: Vec<VideoSubmissionResponse>,
}

/// POST /videos - submit a video for moderation
pub async fn submit_video(
    State(state): State<VideoApiState>,
    Json(payload): Json<VideoSubmissionRequest>,
) -> Result<Json<VideoSubmissionResponse>, (StatusCode, String)> {
    let submission = state.engine.submit(payload).await.map_err(error_response)?;
    Ok(Json(submission.into()))
}

/// POST /videos/{video_id}/decision - apply a coach decision
pub async fn decide_video(
    State(state): State<VideoApiState>,
    Path(video_id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, (StatusCode, String)> {
    let outcome = state
        .engine
        .decide(video_id, payload.decision, payload.notes)
        .await
        .map_err(error_response)?;

    Ok(Json(DecisionResponse {
        submission: outcome.submission.into(),
        xp_applied: outcome.xp_applied,
    }))
}

/// GET /videos/pending - coach review queue
pub async fn pending_videos(
    State(state): State<VideoApiState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<PendingResponse>, (StatusCode, String)> {
    let submissions = state
        .engine
        .pending(query.limit.unwrap_or(50))
        .await
        .map_err(error_response)?;

    Ok(Json(PendingResponse {
        total: submissions.len(),
        submissions: submissions.into_iter().map(Into::into).collect(),
    }))
}

/// Create the video API router
pub fn create_router(state: VideoApiState) -> Router {
    Router::new()
        .route("/", post(submit_video))
        .route("/{video_id}/decision", post(decide_video))
        .route("/pending", get(pending_videos))
        .with_state(state)
}
