//! Video submission types
//!
//! A submission is created PENDING or APPROVED at intake and reaches a
//! terminal state either immediately (auto-approval) or through a later
//! coach decision. APPROVED and REJECTED are terminal - no further
//! decision is accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::moderation::fingerprint::ContentFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VideoStatus {
    Pending,
    Approved,
    Rejected,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "PENDING",
            VideoStatus::Approved => "APPROVED",
            VideoStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(VideoStatus::Pending),
            "APPROVED" => Some(VideoStatus::Approved),
            "REJECTED" => Some(VideoStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Approved | VideoStatus::Rejected)
    }
}

/// Coach verdict on a pending submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSubmission {
    pub id: Uuid,
    pub student_id: String,
    pub challenge_id: String,
    /// Hex digest of the media, supplied by the upload layer
    pub content_hash: String,
    /// Opaque object-storage reference; raw bytes never enter the core
    pub storage_key: String,
    /// Reported media duration in seconds
    pub duration_seconds: f64,
    pub status: VideoStatus,
    pub ai_flag: ContentFlag,
    pub ai_flag_reason: Option<String>,
    /// Auto-approval candidate sampled into manual review
    pub is_spot_check: bool,
    /// Reward applied when the submission is approved
    pub xp_value: i64,
    /// Reward actually applied so far (zero while pending or rejected)
    pub xp_awarded: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// New submission as received from the upload layer
#[derive(Debug, Clone, Deserialize)]
pub struct VideoSubmissionRequest {
    pub student_id: String,
    pub challenge_id: String,
    pub content_hash: String,
    pub storage_key: String,
    pub duration_seconds: f64,
    pub xp_value: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [VideoStatus::Pending, VideoStatus::Approved, VideoStatus::Rejected] {
            assert_eq!(VideoStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(VideoStatus::parse("FLAGGED"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!VideoStatus::Pending.is_terminal());
        assert!(VideoStatus::Approved.is_terminal());
        assert!(VideoStatus::Rejected.is_terminal());
    }
}
