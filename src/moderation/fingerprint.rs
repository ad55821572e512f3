//! Content fingerprint checks
//!
//! Deterministic heuristics over a caller-supplied content hash - the core
//! never touches raw media. Checks run in fixed priority order and the
//! first match wins:
//!
//! | Check | Condition | Flag |
//! |-------|-----------|------|
//! | Duplicate | identical hash within the lookback window | red |
//! | Rate | too many submissions in the trailing hour | yellow |
//! | Duration | reported duration below the minimum | yellow |
//! | - | none of the above | green |

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Moderation flag attached to every video submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFlag {
    Green,
    Yellow,
    Red,
}

impl ContentFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFlag::Green => "green",
            ContentFlag::Yellow => "yellow",
            ContentFlag::Red => "red",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "green" => Some(ContentFlag::Green),
            "yellow" => Some(ContentFlag::Yellow),
            "red" => Some(ContentFlag::Red),
            _ => None,
        }
    }
}

/// Outcome of a fingerprint evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagVerdict {
    pub flag: ContentFlag,
    pub reason: Option<&'static str>,
}

impl FlagVerdict {
    fn green() -> Self {
        Self {
            flag: ContentFlag::Green,
            reason: None,
        }
    }
}

/// Tunable limits for the fingerprint heuristics
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FingerprintLimits {
    /// Duplicate-content lookback window, in days
    pub dedup_window_days: i64,
    /// Submission count (including the one under evaluation) that trips
    /// the rate flag
    pub rate_threshold: i64,
    /// Trailing window for the rate heuristic, in minutes
    pub rate_window_minutes: i64,
    /// Minimum plausible video duration, in seconds
    pub min_duration_seconds: f64,
}

impl Default for FingerprintLimits {
    fn default() -> Self {
        Self {
            dedup_window_days: 30,
            rate_threshold: 5,
            rate_window_minutes: 60,
            min_duration_seconds: 3.0,
        }
    }
}

/// Facts gathered from the store about the submission under evaluation
#[derive(Debug, Clone, Copy)]
pub struct FingerprintContext {
    /// An existing submission shares this content hash within the window
    pub duplicate_in_window: bool,
    /// Submissions by this student in the rate window, counting this one
    pub submissions_in_rate_window: i64,
    /// Reported media duration in seconds
    pub duration_seconds: f64,
}

/// Classify a submission. Fixed priority, first match wins - the checks
/// are never combined.
pub fn classify(ctx: &FingerprintContext, limits: &FingerprintLimits) -> FlagVerdict {
    if ctx.duplicate_in_window {
        return FlagVerdict {
            flag: ContentFlag::Red,
            reason: Some("duplicate content"),
        };
    }

    if ctx.submissions_in_rate_window >= limits.rate_threshold {
        return FlagVerdict {
            flag: ContentFlag::Yellow,
            reason: Some("high submission rate"),
        };
    }

    if ctx.duration_seconds < limits.min_duration_seconds {
        return FlagVerdict {
            flag: ContentFlag::Yellow,
            reason: Some("video very short"),
        };
    }

    FlagVerdict::green()
}

/// A content hash is the lowercase hex encoding of a 32-byte digest.
pub fn validate_content_hash(hash: &str) -> LedgerResult<()> {
    if hash.len() != 64 {
        return Err(LedgerError::Validation(format!(
            "content_hash must be 64 hex characters, got {}",
            hash.len()
        )));
    }

    hex::decode(hash)
        .map_err(|_| LedgerError::Validation("content_hash is not valid hex".to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(duplicate: bool, rate: i64, duration: f64) -> FingerprintContext {
        FingerprintContext {
            duplicate_in_window: duplicate,
            submissions_in_rate_window: rate,
            duration_seconds: duration,
        }
    }

    #[test]
    fn test_clean_submission_is_green() {
        let verdict = classify(&ctx(false, 1, 45.0), &FingerprintLimits::default());
        assert_eq!(verdict.flag, ContentFlag::Green);
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn test_duplicate_is_red() {
        let verdict = classify(&ctx(true, 1, 45.0), &FingerprintLimits::default());
        assert_eq!(verdict.flag, ContentFlag::Red);
        assert_eq!(verdict.reason, Some("duplicate content"));
    }

    #[test]
    fn test_duplicate_outranks_rate_and_duration() {
        // All three conditions hold; the duplicate check wins.
        let verdict = classify(&ctx(true, 9, 1.0), &FingerprintLimits::default());
        assert_eq!(verdict.flag, ContentFlag::Red);
        assert_eq!(verdict.reason, Some("duplicate content"));
    }

    #[test]
    fn test_rate_flag() {
        let limits = FingerprintLimits::default();
        assert_eq!(classify(&ctx(false, 4, 45.0), &limits).flag, ContentFlag::Green);

        let verdict = classify(&ctx(false, 5, 45.0), &limits);
        assert_eq!(verdict.flag, ContentFlag::Yellow);
        assert_eq!(verdict.reason, Some("high submission rate"));
    }

    #[test]
    fn test_rate_outranks_duration() {
        let verdict = classify(&ctx(false, 5, 1.0), &FingerprintLimits::default());
        assert_eq!(verdict.reason, Some("high submission rate"));
    }

    #[test]
    fn test_short_video_is_yellow() {
        let verdict = classify(&ctx(false, 1, 2.9), &FingerprintLimits::default());
        assert_eq!(verdict.flag, ContentFlag::Yellow);
        assert_eq!(verdict.reason, Some("video very short"));

        assert_eq!(
            classify(&ctx(false, 1, 3.0), &FingerprintLimits::default()).flag,
            ContentFlag::Green
        );
    }

    #[test]
    fn test_content_hash_validation() {
        assert!(validate_content_hash(&"a".repeat(64)).is_ok());
        assert!(validate_content_hash("deadbeef").is_err());
        assert!(validate_content_hash(&"z".repeat(64)).is_err());
    }
}
