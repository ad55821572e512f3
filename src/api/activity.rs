//! Activity completion endpoint
//!
//! The routing layer hands completed activities to the gate here. The
//! response is always success-shaped for duplicates and caps, carrying
//! the flags the client needs for its messaging.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::activity::{ActivityGate, ActivityOutcome};
use crate::api::error_response;

#[derive(Clone)]
pub struct ActivityApiState {
    pub gate: Arc<ActivityGate>,
}

/// One completed activity, tagged by family
#[derive(Debug, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ActivityPayload {
    Habit { habit_name: String },
    Quiz { correct: bool },
    FamilyChallenge { challenge_id: String },
    TrustChallenge { challenge_type: String },
    Gauntlet { challenge_id: String, score: i64 },
}

#[derive(Debug, Deserialize)]
pub struct CompleteActivityRequest {
    pub student_id: String,
    #[serde(flatten)]
    pub activity: ActivityPayload,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub awarded: i64,
    pub new_balance: i64,
    pub capped: bool,
    pub duplicate: bool,
}

impl From<ActivityOutcome> for ActivityResponse {
    fn from(outcome: ActivityOutcome) -> Self {
        Self {
            awarded: outcome.awarded,
            new_balance: outcome.new_balance,
            capped: outcome.capped,
            duplicate: outcome.duplicate,
        }
    }
}

/// POST /activity/complete - record one activity completion
pub async fn complete_activity(
    State(state): State<ActivityApiState>,
    Json(payload): Json<CompleteActivityRequest>,
) -> Result<Json<ActivityResponse>, (StatusCode, String)> {
    let student_id = payload.student_id;

    let outcome = match payload.activity {
        ActivityPayload::Habit { habit_name } => {
            state.gate.complete_habit(&student_id, &habit_name).await
        }
        ActivityPayload::Quiz { correct } => state.gate.complete_quiz(&student_id, correct).await,
        ActivityPayload::FamilyChallenge { challenge_id } => {
            state
                .gate
                .complete_family_challenge(&student_id, &challenge_id)
                .await
        }
        ActivityPayload::TrustChallenge { challenge_type } => {
            state
                .gate
                .complete_trust_challenge(&student_id, &challenge_type)
                .await
        }
        ActivityPayload::Gauntlet { challenge_id, score } => {
            state
                .gate
                .complete_gauntlet(&student_id, &challenge_id, score)
                .await
        }
    }
    .map_err(error_response)?;

    Ok(Json(outcome.into()))
}

/// Create the activity API router
pub fn create_router(state: ActivityApiState) -> Router {
    Router::new()
        .route("/complete", post(complete_activity))
        .with_state(state)
}
