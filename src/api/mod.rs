//! HTTP API endpoints for the XP ledger service
//!
//! Provides REST APIs for:
//! - Activity completions (the gate's entry point)
//! - Video submission and coach decisions
//! - Student status and leaderboards (read through reconciliation)
//!
//! Authentication, rate limiting, and the rest of the routing glue live
//! in the surrounding platform; these routers are mounted behind it.

pub mod activity;
pub mod status;
pub mod video;

use axum::http::StatusCode;

use crate::error::LedgerError;

pub use activity::{create_router as create_activity_router, ActivityApiState};
pub use status::{create_router as create_status_router, StatusApiState};
pub use video::{create_router as create_video_router, VideoApiState};

/// Map a domain error onto an HTTP response. Duplicates and caps never
/// reach this - they are success-shaped outcomes.
pub(crate) fn error_response(err: LedgerError) -> (StatusCode, String) {
    let status = match &err {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::AlreadyDecided(_) => StatusCode::CONFLICT,
        LedgerError::Store(_) => {
            if err.is_retryable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        LedgerError::Misconfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let (status, _) = error_response(LedgerError::Validation("bad".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = error_response(LedgerError::not_found("student", "stu_1"));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_response(LedgerError::AlreadyDecided("v1".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
