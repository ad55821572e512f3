//! Integration tests for the XP ledger and moderation engine
//!
//! These tests verify end-to-end behavior of the ledger system:
//! idempotent activity crediting, cap enforcement, balance
//! reconciliation, trust-tier transitions, and the video moderation
//! routes.
//!
//! Database-backed tests run against the PostgreSQL instance named by
//! `TEST_DATABASE_URL` and skip silently when it is not set.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use dojo_ledger::moderation::FingerprintLimits;
use dojo_ledger::{
    ActivityGate, AwardConfig, DatabasePool, FixedSampler, LedgerError, ModerationEngine,
    NotificationBus, ReconciliationService, ReviewDecision, TierThresholds, TrustTier,
    VideoStatus, VideoSubmissionRequest, XpService,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Connect to the test database, or None when TEST_DATABASE_URL is unset.
async fn test_db() -> Option<Arc<DatabasePool>> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db = DatabasePool::new(&url, 5)
        .await
        .expect("failed to connect to test database");
    db.init_schema().await.expect("failed to apply schema");
    Some(Arc::new(db))
}

/// Unique per-test identifier so runs never collide on idempotency keys.
fn unique_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Fabricate a plausible content hash from a seed.
fn content_hash(seed: &str) -> String {
    format!("{:x}", Sha256::digest(seed.as_bytes()))
}

fn gate(db: &Arc<DatabasePool>) -> ActivityGate {
    ActivityGate::new(db.clone(), AwardConfig::default())
}

/// Engine with a deterministic spot-check sampler.
fn engine(db: &Arc<DatabasePool>, sampled: bool) -> ModerationEngine {
    ModerationEngine::new(
        db.clone(),
        TierThresholds::default(),
        FingerprintLimits::default(),
        Arc::new(FixedSampler(sampled)),
        NotificationBus::default(),
    )
}

fn video_request(student_id: &str, challenge_id: &str, hash_seed: &str) -> VideoSubmissionRequest {
    VideoSubmissionRequest {
        student_id: student_id.to_string(),
        challenge_id: challenge_id.to_string(),
        content_hash: content_hash(hash_seed),
        storage_key: format!("videos/{}", hash_seed),
        duration_seconds: 42.0,
        xp_value: 15,
    }
}

async fn set_tier(db: &DatabasePool, student_id: &str, tier: TrustTier, streak: i32) {
    sqlx::query("UPDATE students SET trust_tier = $2, approval_streak = $3 WHERE id = $1")
        .bind(student_id)
        .bind(tier.as_str())
        .bind(streak)
        .execute(db.pool())
        .await
        .expect("failed to set tier");
}

// ============================================================================
// Activity Gate: idempotency and caps
// ============================================================================

mod activity_gate {
    use super::*;

    #[tokio::test]
    async fn test_habit_idempotency_single_earn() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let first = gate.complete_habit(&student, "pushups").await.unwrap();
        assert!(!first.duplicate);
        assert_eq!(first.awarded, 3);
        assert_eq!(first.new_balance, 3);

        let second = gate.complete_habit(&student, "pushups").await.unwrap();
        assert!(second.duplicate);
        assert_eq!(second.awarded, 3, "duplicate reports the original award");
        assert_eq!(second.new_balance, 3, "no double credit");

        let earns = db
            .transactions()
            .count_earns_for_reason(&student, "habit:pushups")
            .await
            .unwrap();
        assert_eq!(earns, 1, "exactly one EARN row per idempotency key");
    }

    #[tokio::test]
    async fn test_habit_cap_end_to_end() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        // Free tier: cap 9, 3 XP per habit.
        for (i, habit) in ["kata", "stretching", "situps"].iter().enumerate() {
            let outcome = gate.complete_habit(&student, habit).await.unwrap();
            assert!(!outcome.capped);
            assert_eq!(outcome.awarded, 3);
            assert_eq!(outcome.new_balance, 3 * (i as i64 + 1));
        }

        let fourth = gate.complete_habit(&student, "running").await.unwrap();
        assert!(fourth.capped);
        assert!(!fourth.duplicate);
        assert_eq!(fourth.awarded, 0, "past-cap completion records zero");
        assert_eq!(fourth.new_balance, 9, "balance stays at the cap");

        // The completion record still exists: a repeat is a duplicate.
        let repeat = gate.complete_habit(&student, "running").await.unwrap();
        assert!(repeat.duplicate);
        assert_eq!(repeat.awarded, 0);
    }

    #[tokio::test]
    async fn test_premium_cap_is_higher() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, true).await.unwrap();

        for habit in ["a", "b", "c", "d", "e", "f", "g"] {
            let outcome = gate.complete_habit(&student, habit).await.unwrap();
            assert!(!outcome.capped, "premium cap is 21 = 7 habits");
        }

        let eighth = gate.complete_habit(&student, "h").await.unwrap();
        assert!(eighth.capped);
        assert_eq!(eighth.new_balance, 21);
    }

    #[tokio::test]
    async fn test_quiz_one_attempt_per_day() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let first = gate.complete_quiz(&student, true).await.unwrap();
        assert_eq!(first.awarded, 5);

        // Second attempt the same day is a duplicate even with a
        // different answer.
        let second = gate.complete_quiz(&student, false).await.unwrap();
        assert!(second.duplicate);
        assert_eq!(second.awarded, 5, "reports the original award");
        assert_eq!(second.new_balance, 5);
    }

    #[tokio::test]
    async fn test_incorrect_quiz_pays_less() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let outcome = gate.complete_quiz(&student, false).await.unwrap();
        assert_eq!(outcome.awarded, 1);
    }

    #[tokio::test]
    async fn test_family_challenge_daily_limit() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        for i in 0..3 {
            let outcome = gate
                .complete_family_challenge(&student, &format!("fc_{}", i))
                .await
                .unwrap();
            assert!(!outcome.capped);
            assert_eq!(outcome.awarded, 5);
        }

        // Fourth distinct challenge the same day: recorded, unrewarded.
        let fourth = gate.complete_family_challenge(&student, "fc_3").await.unwrap();
        assert!(fourth.capped);
        assert_eq!(fourth.awarded, 0);
        assert_eq!(fourth.new_balance, 15);

        // Repeating one of the rewarded ones is a duplicate, not a cap.
        let repeat = gate.complete_family_challenge(&student, "fc_0").await.unwrap();
        assert!(repeat.duplicate);
        assert_eq!(repeat.awarded, 5);
    }

    #[tokio::test]
    async fn test_trust_challenge_one_per_type_per_day() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let first = gate.complete_trust_challenge(&student, "meditation").await.unwrap();
        assert_eq!(first.awarded, 5);

        let repeat = gate.complete_trust_challenge(&student, "meditation").await.unwrap();
        assert!(repeat.duplicate);

        // A different type the same day is rewarded independently.
        let other = gate.complete_trust_challenge(&student, "nutrition").await.unwrap();
        assert!(!other.duplicate);
        assert_eq!(other.new_balance, 10);
    }

    #[tokio::test]
    async fn test_gauntlet_weekly_with_personal_best() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let first = gate.complete_gauntlet(&student, "burpee-blitz", 120).await.unwrap();
        assert_eq!(first.awarded, 10);
        assert_eq!(
            gate.gauntlet_best(&student, "burpee-blitz").await.unwrap(),
            Some(120)
        );

        // Same challenge, same ISO week: duplicate, best unchanged.
        let repeat = gate.complete_gauntlet(&student, "burpee-blitz", 500).await.unwrap();
        assert!(repeat.duplicate);
        assert_eq!(
            gate.gauntlet_best(&student, "burpee-blitz").await.unwrap(),
            Some(120)
        );

        // The submitted score lands on the cross-club ledger.
        let global = db.transactions().sum_global_earned(&student).await.unwrap();
        assert_eq!(global, 120);
    }

    #[tokio::test]
    async fn test_gauntlet_rejects_negative_score() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let err = gate.complete_gauntlet(&student, "burpee-blitz", -1).await;
        assert!(matches!(err, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_student_is_not_found() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);

        let err = gate.complete_habit(&unique_id("ghost"), "pushups").await;
        assert!(matches!(err, Err(LedgerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_streak_counts_consecutive_days() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        // Seed qualifying completions on D-2 and D-1, then complete one
        // today through the gate.
        for days_back in [1i64, 2] {
            sqlx::query(
                r#"
                INSERT INTO habit_completions (student_id, habit_name, day, awarded)
                VALUES ($1, 'seed', (NOW() AT TIME ZONE 'UTC')::DATE - $2::INT, 0)
                "#,
            )
            .bind(&student)
            .bind(days_back as i32)
            .execute(db.pool())
            .await
            .unwrap();
        }

        gate.complete_habit(&student, "pushups").await.unwrap();
        assert_eq!(gate.streak(&student).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_streak_broken_by_gap() {
        let Some(db) = test_db().await else { return };
        let gate = gate(&db);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        // Activity only on D-3: streak is 0 at D.
        sqlx::query(
            r#"
            INSERT INTO habit_completions (student_id, habit_name, day, awarded)
            VALUES ($1, 'seed', (NOW() AT TIME ZONE 'UTC')::DATE - 3, 0)
            "#,
        )
        .bind(&student)
        .execute(db.pool())
        .await
        .unwrap();

        assert_eq!(gate.streak(&student).await.unwrap(), 0);
    }
}

// ============================================================================
// Ledger: mutation discipline and reconciliation
// ============================================================================

mod ledger {
    use super::*;

    #[tokio::test]
    async fn test_zero_delta_writes_no_row() {
        let Some(db) = test_db().await else { return };
        let service = XpService::new(db.pool().clone());
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let balance = service.apply_delta(&student, 0, "noop").await.unwrap();
        assert_eq!(balance, 0);

        let history = db.transactions().history(&student, 10).await.unwrap();
        assert!(history.is_empty(), "zero deltas leave no audit row");
    }

    #[tokio::test]
    async fn test_delta_on_missing_student_is_not_found() {
        let Some(db) = test_db().await else { return };
        let service = XpService::new(db.pool().clone());

        let err = service.apply_delta(&unique_id("ghost"), 5, "habit:x").await;
        assert!(matches!(err, Err(LedgerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_spend_appends_spend_row() {
        let Some(db) = test_db().await else { return };
        let service = XpService::new(db.pool().clone());
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        service.apply_delta(&student, 10, "habit:x").await.unwrap();
        let balance = service.apply_delta(&student, -4, "store:headband").await.unwrap();
        assert_eq!(balance, 6);

        let history = db.transactions().history(&student, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, 4, "SPEND rows carry the magnitude");
    }

    #[tokio::test]
    async fn test_stale_cache_never_regresses_displayed_balance() {
        let Some(db) = test_db().await else { return };
        let service = XpService::new(db.pool().clone());
        let recon = ReconciliationService::new(db.clone());
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        service.apply_delta(&student, 30, "habit:x").await.unwrap();

        // Simulate a cache that fell behind the log.
        sqlx::query("UPDATE students SET total_xp = 5 WHERE id = $1")
            .bind(&student)
            .execute(db.pool())
            .await
            .unwrap();

        let displayed = recon.lifetime_xp(&student).await.unwrap();
        assert_eq!(displayed, 30, "reconciliation returns the log sum");

        // The opportunistic patch repaired the cache for O(1) reads.
        let cached = db.students().get(&student).await.unwrap().unwrap().total_xp;
        assert_eq!(cached, 30);

        let again = recon.lifetime_xp(&student).await.unwrap();
        assert!(again >= displayed, "displayed balance never decreases");
    }

    #[tokio::test]
    async fn test_monthly_floor_for_students_created_this_month() {
        let Some(db) = test_db().await else { return };
        let recon = ReconciliationService::new(db.clone());
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        // Pre-ledger-era XP: cached balance with no transaction rows.
        sqlx::query("UPDATE students SET total_xp = 50 WHERE id = $1")
            .bind(&student)
            .execute(db.pool())
            .await
            .unwrap();

        let monthly = recon.monthly_xp(&student).await.unwrap();
        assert_eq!(monthly, 50, "new students floor monthly at the all-time cache");
    }

    #[tokio::test]
    async fn test_monthly_sum_for_older_students() {
        let Some(db) = test_db().await else { return };
        let service = XpService::new(db.pool().clone());
        let recon = ReconciliationService::new(db.clone());
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        service.apply_delta(&student, 12, "habit:x").await.unwrap();

        // Backdate enrollment past the month boundary.
        sqlx::query("UPDATE students SET created_at = NOW() - INTERVAL '60 days' WHERE id = $1")
            .bind(&student)
            .execute(db.pool())
            .await
            .unwrap();

        let monthly = recon.monthly_xp(&student).await.unwrap();
        assert_eq!(monthly, 12, "older students see this month's earnings only");
    }
}

// ============================================================================
// Moderation: routing, trust tiers, terminal decisions
// ============================================================================

mod moderation {
    use super::*;

    #[tokio::test]
    async fn test_green_unverified_goes_to_review() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, false);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let sub = engine
            .submit(video_request(&student, "kata-1", &unique_id("v")))
            .await
            .unwrap();

        assert_eq!(sub.status, VideoStatus::Pending);
        assert!(!sub.is_spot_check);
        assert_eq!(sub.xp_awarded, 0);
    }

    #[tokio::test]
    async fn test_green_verified_auto_approves() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, false);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();
        set_tier(&db, &student, TrustTier::Verified, 5).await;

        let sub = engine
            .submit(video_request(&student, "kata-1", &unique_id("v")))
            .await
            .unwrap();

        assert_eq!(sub.status, VideoStatus::Approved);
        assert_eq!(sub.xp_awarded, 15);

        let updated = db.students().get(&student).await.unwrap().unwrap();
        assert_eq!(updated.total_xp, 15, "stored XP applied on auto-approval");
        assert_eq!(updated.approval_streak, 6);
    }

    #[tokio::test]
    async fn test_spot_check_routes_to_review() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, true);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();
        set_tier(&db, &student, TrustTier::Trusted, 30).await;

        let sub = engine
            .submit(video_request(&student, "kata-1", &unique_id("v")))
            .await
            .unwrap();

        assert_eq!(sub.status, VideoStatus::Pending);
        assert!(sub.is_spot_check);

        let updated = db.students().get(&student).await.unwrap().unwrap();
        assert_eq!(updated.total_xp, 0, "no XP until the spot check clears");
        assert_eq!(updated.approval_streak, 30, "streak untouched while pending");
    }

    #[tokio::test]
    async fn test_duplicate_content_forces_review_even_for_trusted() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, false);
        let first_student = unique_id("stu");
        let second_student = unique_id("stu");
        db.students().create(&first_student, false).await.unwrap();
        db.students().create(&second_student, false).await.unwrap();
        set_tier(&db, &second_student, TrustTier::Trusted, 30).await;

        let seed = unique_id("shared");
        engine
            .submit(video_request(&first_student, "kata-1", &seed))
            .await
            .unwrap();

        let copy = engine
            .submit(video_request(&second_student, "kata-2", &seed))
            .await
            .unwrap();

        assert_eq!(copy.ai_flag.as_str(), "red");
        assert_eq!(copy.ai_flag_reason.as_deref(), Some("duplicate content"));
        assert_eq!(copy.status, VideoStatus::Pending);
    }

    #[tokio::test]
    async fn test_submission_rate_trips_yellow_flag() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, false);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        for i in 0..4 {
            let sub = engine
                .submit(video_request(&student, &format!("kata-{}", i), &unique_id("v")))
                .await
                .unwrap();
            assert_eq!(sub.ai_flag.as_str(), "green");
        }

        let fifth = engine
            .submit(video_request(&student, "kata-5", &unique_id("v")))
            .await
            .unwrap();
        assert_eq!(fifth.ai_flag.as_str(), "yellow");
        assert_eq!(fifth.ai_flag_reason.as_deref(), Some("high submission rate"));
    }

    #[tokio::test]
    async fn test_short_video_flagged_yellow() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, false);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();
        set_tier(&db, &student, TrustTier::Verified, 5).await;

        let mut req = video_request(&student, "kata-1", &unique_id("v"));
        req.duration_seconds = 1.5;

        let sub = engine.submit(req).await.unwrap();
        assert_eq!(sub.ai_flag.as_str(), "yellow");
        assert_eq!(sub.ai_flag_reason.as_deref(), Some("video very short"));
        assert_eq!(sub.status, VideoStatus::Pending, "yellow overrides the tier");
    }

    #[tokio::test]
    async fn test_manual_approval_applies_xp_and_upgrades_tier() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, false);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();
        // One approval away from the verified threshold.
        set_tier(&db, &student, TrustTier::Unverified, 9).await;

        let sub = engine
            .submit(video_request(&student, "kata-1", &unique_id("v")))
            .await
            .unwrap();
        assert_eq!(sub.status, VideoStatus::Pending);

        let outcome = engine
            .decide(sub.id, ReviewDecision::Approved, Some("clean form".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome.xp_applied, 15);
        assert_eq!(outcome.submission.status, VideoStatus::Approved);
        assert_eq!(outcome.submission.notes.as_deref(), Some("clean form"));

        let updated = db.students().get(&student).await.unwrap().unwrap();
        assert_eq!(updated.total_xp, 15);
        assert_eq!(updated.approval_streak, 10);
        assert_eq!(updated.trust_tier, TrustTier::Verified);
    }

    #[tokio::test]
    async fn test_rejection_resets_streak_and_tier() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, true);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();
        set_tier(&db, &student, TrustTier::Trusted, 27).await;

        // Spot-checked submission, then the coach rejects it.
        let sub = engine
            .submit(video_request(&student, "kata-1", &unique_id("v")))
            .await
            .unwrap();
        let outcome = engine
            .decide(sub.id, ReviewDecision::Rejected, None)
            .await
            .unwrap();

        assert_eq!(outcome.xp_applied, 0);
        assert_eq!(outcome.submission.status, VideoStatus::Rejected);

        let updated = db.students().get(&student).await.unwrap().unwrap();
        assert_eq!(updated.trust_tier, TrustTier::Unverified);
        assert_eq!(updated.approval_streak, 0);
        assert_eq!(updated.rejection_count, 1);
        assert_eq!(updated.total_xp, 0, "no XP from a rejected submission");
    }

    #[tokio::test]
    async fn test_terminal_submission_accepts_no_second_decision() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, false);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let sub = engine
            .submit(video_request(&student, "kata-1", &unique_id("v")))
            .await
            .unwrap();
        engine.decide(sub.id, ReviewDecision::Approved, None).await.unwrap();

        let err = engine.decide(sub.id, ReviewDecision::Rejected, None).await;
        assert!(matches!(err, Err(LedgerError::AlreadyDecided(_))));

        // The first decision stands untouched.
        let stored = db.videos().get(sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Approved);
    }

    #[tokio::test]
    async fn test_decision_emits_notification_event() {
        let Some(db) = test_db().await else { return };
        let bus = NotificationBus::default();
        let mut rx = bus.subscribe();
        let engine = ModerationEngine::new(
            db.clone(),
            TierThresholds::default(),
            FingerprintLimits::default(),
            Arc::new(FixedSampler(false)),
            bus,
        );
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let sub = engine
            .submit(video_request(&student, "kata-1", &unique_id("v")))
            .await
            .unwrap();
        engine.decide(sub.id, ReviewDecision::Rejected, None).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.video_id, sub.id);
        assert_eq!(event.decision, VideoStatus::Rejected);
        assert_eq!(event.xp_applied, 0);
    }

    #[tokio::test]
    async fn test_pending_queue_lists_oldest_first() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, false);
        let student = unique_id("stu");
        db.students().create(&student, false).await.unwrap();

        let first = engine
            .submit(video_request(&student, "kata-1", &unique_id("v")))
            .await
            .unwrap();
        let second = engine
            .submit(video_request(&student, "kata-2", &unique_id("v")))
            .await
            .unwrap();

        let pending = engine.pending(200).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|s| s.id).collect();
        let first_pos = ids.iter().position(|id| *id == first.id).unwrap();
        let second_pos = ids.iter().position(|id| *id == second.id).unwrap();
        assert!(first_pos < second_pos);
    }

    #[tokio::test]
    async fn test_malformed_content_hash_rejected_before_store() {
        let Some(db) = test_db().await else { return };
        let engine = engine(&db, false);

        let mut req = video_request("stu_any", "kata-1", "seed");
        req.content_hash = "not-a-hash".to_string();

        let err = engine.submit(req).await;
        assert!(matches!(err, Err(LedgerError::Validation(_))));
    }
}
