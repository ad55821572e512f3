//! Trust-Tier Moderation Engine
//!
//! Decides synchronously at submission time whether a video is approved
//! outright, routed to manual review, or sampled into a spot check, and
//! applies coach decisions on pending submissions. All balance and trust
//! mutations run inside the submission's database transaction; the
//! decision notification is emitted only after commit.

use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::students::{Student, StudentRepository};
use crate::database::videos::VideoRepository;
use crate::database::DatabasePool;
use crate::error::{require_id, LedgerError, LedgerResult};
use crate::ledger::service;
use crate::ledger::transaction::XpTransactionType;
use crate::moderation::fingerprint::{
    classify, validate_content_hash, ContentFlag, FingerprintContext, FingerprintLimits,
};
use crate::moderation::submission::{
    ReviewDecision, VideoStatus, VideoSubmission, VideoSubmissionRequest,
};
use crate::moderation::tier::{tier_for_streak, TierThresholds, TrustTier};
use crate::notify::{NotificationBus, VideoDecisionEvent};

/// Source of the spot-check draw. Injectable so tests can force both the
/// sampled and the non-sampled branch.
pub trait SpotCheckSampler: Send + Sync {
    fn sample(&self) -> bool;
}

/// Production sampler: one independent Bernoulli draw per candidate.
pub struct RandomSampler {
    rate: f64,
}

impl RandomSampler {
    pub fn new(rate: f64) -> LedgerResult<Self> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(LedgerError::Misconfiguration(format!(
                "spot-check rate must be within [0.0, 1.0], got {}",
                rate
            )));
        }
        Ok(Self { rate })
    }
}

impl SpotCheckSampler for RandomSampler {
    fn sample(&self) -> bool {
        rand::thread_rng().gen_bool(self.rate)
    }
}

/// Deterministic sampler for tests.
pub struct FixedSampler(pub bool);

impl SpotCheckSampler for FixedSampler {
    fn sample(&self) -> bool {
        self.0
    }
}

/// Where a new submission lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionRoute {
    /// Approved immediately, XP applied
    AutoApprove,
    /// Auto-approval candidate sampled into manual review
    SpotCheck,
    /// Forced manual review
    ManualReview,
}

/// Routing matrix. The sampler closure is drawn at most once, and only
/// on the auto-approval path.
pub fn route_submission(
    flag: ContentFlag,
    tier: TrustTier,
    sample: impl FnOnce() -> bool,
) -> SubmissionRoute {
    match flag {
        ContentFlag::Red | ContentFlag::Yellow => SubmissionRoute::ManualReview,
        ContentFlag::Green => {
            if tier.auto_approval_eligible() {
                if sample() {
                    SubmissionRoute::SpotCheck
                } else {
                    SubmissionRoute::AutoApprove
                }
            } else {
                SubmissionRoute::ManualReview
            }
        }
    }
}

/// Outcome of a coach decision
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub submission: VideoSubmission,
    /// XP actually applied by this decision (zero on rejection)
    pub xp_applied: i64,
}

pub struct ModerationEngine {
    db: Arc<DatabasePool>,
    thresholds: TierThresholds,
    limits: FingerprintLimits,
    sampler: Arc<dyn SpotCheckSampler>,
    notifications: NotificationBus,
}

impl ModerationEngine {
    pub fn new(
        db: Arc<DatabasePool>,
        thresholds: TierThresholds,
        limits: FingerprintLimits,
        sampler: Arc<dyn SpotCheckSampler>,
        notifications: NotificationBus,
    ) -> Self {
        Self {
            db,
            thresholds,
            limits,
            sampler,
            notifications,
        }
    }

    fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    /// Intake a video submission and decide its route synchronously.
    pub async fn submit(&self, req: VideoSubmissionRequest) -> LedgerResult<VideoSubmission> {
        require_id("student_id", &req.student_id)?;
        require_id("challenge_id", &req.challenge_id)?;
        require_id("storage_key", &req.storage_key)?;
        validate_content_hash(&req.content_hash)?;

        if req.xp_value < 0 {
            return Err(LedgerError::Validation(
                "xp_value must not be negative".to_string(),
            ));
        }
        if !req.duration_seconds.is_finite() || req.duration_seconds < 0.0 {
            return Err(LedgerError::Validation(
                "duration_seconds must be a non-negative number".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let student = StudentRepository::fetch(&mut tx, &req.student_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("student", &req.student_id))?;

        // Fingerprint lookbacks run before the row exists, so the counts
        // below are priors; the rate count adds the submission itself.
        let duplicate = VideoRepository::exists_hash_since(
            &mut tx,
            &req.content_hash,
            now - Duration::days(self.limits.dedup_window_days),
        )
        .await?;
        let prior_in_window = VideoRepository::count_student_since(
            &mut tx,
            &req.student_id,
            now - Duration::minutes(self.limits.rate_window_minutes),
        )
        .await?;

        let verdict = classify(
            &FingerprintContext {
                duplicate_in_window: duplicate,
                submissions_in_rate_window: prior_in_window + 1,
                duration_seconds: req.duration_seconds,
            },
            &self.limits,
        );

        let route = route_submission(verdict.flag, student.trust_tier, || self.sampler.sample());

        let mut submission = VideoSubmission {
            id: Uuid::new_v4(),
            student_id: req.student_id.clone(),
            challenge_id: req.challenge_id.clone(),
            content_hash: req.content_hash.clone(),
            storage_key: req.storage_key.clone(),
            duration_seconds: req.duration_seconds,
            status: VideoStatus::Pending,
            ai_flag: verdict.flag,
            ai_flag_reason: verdict.reason.map(str::to_string),
            is_spot_check: route == SubmissionRoute::SpotCheck,
            xp_value: req.xp_value,
            xp_awarded: 0,
            notes: None,
            created_at: now,
            decided_at: None,
        };

        if route == SubmissionRoute::AutoApprove {
            submission.status = VideoStatus::Approved;
            submission.xp_awarded = req.xp_value;
            submission.decided_at = Some(now);
        }

        VideoRepository::insert(&mut tx, &submission).await?;

        if route == SubmissionRoute::AutoApprove {
            self.approve_in(&mut tx, &student, &submission).await?;
        }

        tx.commit().await?;

        info!(
            video_id = %submission.id,
            student_id = %submission.student_id,
            flag = %submission.ai_flag.as_str(),
            status = %submission.status.as_str(),
            spot_check = submission.is_spot_check,
            "Video submission routed"
        );

        Ok(submission)
    }

    /// Apply a coach decision to a pending submission. Terminal
    /// submissions accept no further decision.
    pub async fn decide(
        &self,
        video_id: Uuid,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> LedgerResult<DecisionOutcome> {
        let mut tx = self.pool().begin().await?;

        let submission = VideoRepository::fetch_for_update(&mut tx, video_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("video submission", video_id.to_string()))?;

        if submission.status.is_terminal() {
            tx.rollback().await?;
            return Err(LedgerError::AlreadyDecided(video_id.to_string()));
        }

        let student = StudentRepository::fetch(&mut tx, &submission.student_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("student", &submission.student_id))?;

        let (status, xp_applied) = match decision {
            ReviewDecision::Approved => {
                VideoRepository::mark_decided(
                    &mut tx,
                    video_id,
                    VideoStatus::Approved,
                    submission.xp_value,
                    notes.as_deref(),
                )
                .await?;
                self.approve_in(&mut tx, &student, &submission).await?;
                (VideoStatus::Approved, submission.xp_value)
            }
            ReviewDecision::Rejected => {
                VideoRepository::mark_decided(
                    &mut tx,
                    video_id,
                    VideoStatus::Rejected,
                    0,
                    notes.as_deref(),
                )
                .await?;
                StudentRepository::record_rejection(&mut tx, &submission.student_id).await?;
                debug!(
                    student_id = %submission.student_id,
                    "Rejection reset approval streak and trust tier"
                );
                (VideoStatus::Rejected, 0)
            }
        };

        tx.commit().await?;

        // Outbound side effects stay outside the ledger transaction.
        self.notifications.publish(VideoDecisionEvent {
            video_id,
            student_id: submission.student_id.clone(),
            challenge_id: submission.challenge_id.clone(),
            decision: status,
            xp_applied,
            decided_at: Utc::now(),
        });

        let updated = self
            .db
            .videos()
            .get(video_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("video submission", video_id.to_string()))?;

        info!(
            video_id = %video_id,
            decision = %status.as_str(),
            xp_applied = xp_applied,
            "Video decision recorded"
        );

        Ok(DecisionOutcome {
            submission: updated,
            xp_applied,
        })
    }

    /// Coach review queue, oldest first.
    pub async fn pending(&self, limit: i64) -> LedgerResult<Vec<VideoSubmission>> {
        self.db.videos().list_pending(limit.clamp(1, 200)).await
    }

    /// Shared approval bookkeeping: apply the stored XP (club plus the
    /// mirrored cross-club grant), bump the streak, and upgrade the tier
    /// when a threshold is crossed.
    async fn approve_in(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        student: &Student,
        submission: &VideoSubmission,
    ) -> LedgerResult<()> {
        let reason = format!("video:{}", submission.challenge_id);

        if submission.xp_value > 0 {
            service::apply_delta(tx, &student.id, submission.xp_value, &reason).await?;
            service::apply_global_delta(
                tx,
                &student.id,
                submission.xp_value,
                XpTransactionType::GlobalEarn,
                &reason,
            )
            .await?;
        }

        let new_streak = StudentRepository::record_approval(tx, &student.id)
            .await?
            .ok_or_else(|| LedgerError::not_found("student", &student.id))?;

        let upgraded = tier_for_streak(student.trust_tier, new_streak, &self.thresholds);
        if upgraded != student.trust_tier {
            StudentRepository::set_tier(tx, &student.id, upgraded).await?;
            info!(
                student_id = %student.id,
                streak = new_streak,
                tier = %upgraded.as_str(),
                "Trust tier upgraded"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_red_and_yellow_force_review() {
        for flag in [ContentFlag::Red, ContentFlag::Yellow] {
            for tier in [TrustTier::Unverified, TrustTier::Verified, TrustTier::Trusted] {
                let route = route_submission(flag, tier, || panic!("sampler must not be drawn"));
                assert_eq!(route, SubmissionRoute::ManualReview);
            }
        }
    }

    #[test]
    fn test_green_unverified_forces_review() {
        let route = route_submission(ContentFlag::Green, TrustTier::Unverified, || {
            panic!("sampler must not be drawn")
        });
        assert_eq!(route, SubmissionRoute::ManualReview);
    }

    #[test]
    fn test_green_trusted_auto_approves_when_not_sampled() {
        for tier in [TrustTier::Verified, TrustTier::Trusted] {
            let route = route_submission(ContentFlag::Green, tier, || false);
            assert_eq!(route, SubmissionRoute::AutoApprove);
        }
    }

    #[test]
    fn test_green_trusted_spot_checked_when_sampled() {
        for tier in [TrustTier::Verified, TrustTier::Trusted] {
            let route = route_submission(ContentFlag::Green, tier, || true);
            assert_eq!(route, SubmissionRoute::SpotCheck);
        }
    }

    #[test]
    fn test_random_sampler_rejects_bad_rate() {
        assert!(RandomSampler::new(-0.1).is_err());
        assert!(RandomSampler::new(1.1).is_err());
        assert!(RandomSampler::new(0.1).is_ok());
    }

    #[test]
    fn test_spot_check_fraction_converges() {
        let sampler = RandomSampler::new(0.1).unwrap();
        let trials = 20_000;
        let sampled = (0..trials).filter(|_| sampler.sample()).count() as f64;
        let fraction = sampled / trials as f64;
        // 1/10 within generous statistical tolerance.
        assert!(
            (fraction - 0.1).abs() < 0.015,
            "spot-check fraction {} drifted from 0.1",
            fraction
        );
    }
}
