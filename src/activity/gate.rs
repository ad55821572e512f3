//! Activity Gate - idempotency keys and period caps
//!
//! Every reward-eligible activity passes through here exactly once per
//! period. The existence check and the reward write share one
//! SERIALIZABLE transaction on one connection, so two concurrent
//! requests for the same key cannot both observe "no prior record" and
//! double-credit. A detected duplicate rolls the unit back entirely and
//! reports the previously recorded award as a success-shaped outcome.

use chrono::Duration;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::activity::period::{self, IsoWeek};
use crate::activity::streak::{streak_from, MAX_STREAK_DAYS};
use crate::config::AwardConfig;
use crate::database::completions::CompletionRepository;
use crate::database::students::{Student, StudentRepository};
use crate::database::DatabasePool;
use crate::error::{require_id, LedgerError, LedgerResult};
use crate::ledger::service;
use crate::ledger::transaction::XpTransactionType;

/// Result of one completion attempt. Duplicates and reached caps are
/// reported here, never as errors.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActivityOutcome {
    /// XP credited by this call (or by the original call, when duplicate)
    pub awarded: i64,
    /// Club balance after the call
    pub new_balance: i64,
    /// The period cap swallowed some or all of the reward
    pub capped: bool,
    /// The idempotency key already existed
    pub duplicate: bool,
}

impl ActivityOutcome {
    fn duplicate(awarded: i64, balance: i64) -> Self {
        Self {
            awarded,
            new_balance: balance,
            capped: false,
            duplicate: true,
        }
    }
}

pub struct ActivityGate {
    db: Arc<DatabasePool>,
    awards: AwardConfig,
}

impl ActivityGate {
    pub fn new(db: Arc<DatabasePool>, awards: AwardConfig) -> Self {
        Self { db, awards }
    }

    fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    /// Open the serializable unit shared by the gate check and the reward
    /// mutation.
    async fn begin_serializable(&self) -> LedgerResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn fetch_student(
        tx: &mut Transaction<'static, Postgres>,
        student_id: &str,
    ) -> LedgerResult<Student> {
        StudentRepository::fetch(tx, student_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("student", student_id))
    }

    /// Record a habit completion. Daily XP is capped per student
    /// (free vs premium); completions past the cap still create the
    /// record so streaks keep counting, with awarded = 0.
    pub async fn complete_habit(
        &self,
        student_id: &str,
        habit_name: &str,
    ) -> LedgerResult<ActivityOutcome> {
        require_id("student_id", student_id)?;
        require_id("habit_name", habit_name)?;

        let day = period::today_utc();
        let mut tx = self.begin_serializable().await?;
        let student = Self::fetch_student(&mut tx, student_id).await?;

        if let Some(prior) = CompletionRepository::habit_find(&mut tx, student_id, habit_name, day).await? {
            tx.rollback().await?;
            debug!(student_id = %student_id, habit = %habit_name, "Duplicate habit completion");
            return Ok(ActivityOutcome::duplicate(prior, student.total_xp));
        }

        let cap = if student.is_premium {
            self.awards.habit_daily_cap_premium
        } else {
            self.awards.habit_daily_cap_free
        };
        let day_total = CompletionRepository::habit_day_total(&mut tx, student_id, day).await?;
        let remaining = (cap - day_total).max(0);
        let awarded = remaining.min(self.awards.habit_xp);
        let capped = awarded < self.awards.habit_xp;

        let inserted =
            CompletionRepository::habit_insert(&mut tx, student_id, habit_name, day, awarded).await?;
        if !inserted {
            return self.lost_insert_race_habit(tx, student_id, habit_name, day).await;
        }

        let reason = format!("habit:{}", habit_name);
        let new_balance = if awarded > 0 {
            service::apply_delta(&mut tx, student_id, awarded, &reason).await?
        } else {
            student.total_xp
        };

        tx.commit().await?;

        info!(
            student_id = %student_id,
            habit = %habit_name,
            awarded = awarded,
            capped = capped,
            "Habit completion recorded"
        );

        Ok(ActivityOutcome {
            awarded,
            new_balance,
            capped,
            duplicate: false,
        })
    }

    /// Record the single daily quiz attempt. Correct and incorrect
    /// answers pay different fixed amounts; a second attempt the same day
    /// is a duplicate regardless of quiz variant or answer.
    pub async fn complete_quiz(
        &self,
        student_id: &str,
        correct: bool,
    ) -> LedgerResult<ActivityOutcome> {
        require_id("student_id", student_id)?;

        let day = period::today_utc();
        let mut tx = self.begin_serializable().await?;
        let student = Self::fetch_student(&mut tx, student_id).await?;

        if let Some(prior) = CompletionRepository::quiz_find(&mut tx, student_id, day).await? {
            tx.rollback().await?;
            debug!(student_id = %student_id, "Duplicate quiz attempt");
            return Ok(ActivityOutcome::duplicate(prior, student.total_xp));
        }

        let awarded = if correct {
            self.awards.quiz_correct_xp
        } else {
            self.awards.quiz_incorrect_xp
        };

        let inserted =
            CompletionRepository::quiz_insert(&mut tx, student_id, day, correct, awarded).await?;
        if !inserted {
            tx.rollback().await?;
            let mut conn = self.pool().acquire().await?;
            let prior = CompletionRepository::quiz_find(&mut conn, student_id, day)
                .await?
                .unwrap_or(0);
            return Ok(ActivityOutcome::duplicate(prior, student.total_xp));
        }

        let reason = if correct { "quiz:correct" } else { "quiz:incorrect" };
        let new_balance = if awarded > 0 {
            service::apply_delta(&mut tx, student_id, awarded, reason).await?
        } else {
            student.total_xp
        };

        tx.commit().await?;

        info!(student_id = %student_id, correct = correct, awarded = awarded, "Quiz attempt recorded");

        Ok(ActivityOutcome {
            awarded,
            new_balance,
            capped: false,
            duplicate: false,
        })
    }

    /// Record a family-challenge completion. Beyond the per-challenge
    /// daily key there is a global cap on distinct family challenges per
    /// student per day; past it the completion is recorded unrewarded.
    pub async fn complete_family_challenge(
        &self,
        student_id: &str,
        challenge_id: &str,
    ) -> LedgerResult<ActivityOutcome> {
        require_id("student_id", student_id)?;
        require_id("challenge_id", challenge_id)?;

        let day = period::today_utc();
        let mut tx = self.begin_serializable().await?;
        let student = Self::fetch_student(&mut tx, student_id).await?;

        if let Some(prior) =
            CompletionRepository::family_find(&mut tx, student_id, challenge_id, day).await?
        {
            tx.rollback().await?;
            debug!(student_id = %student_id, challenge_id = %challenge_id, "Duplicate family challenge");
            return Ok(ActivityOutcome::duplicate(prior, student.total_xp));
        }

        let completed_today =
            CompletionRepository::family_count_day(&mut tx, student_id, day).await?;
        let capped = completed_today >= self.awards.family_daily_limit;
        let awarded = if capped { 0 } else { self.awards.family_challenge_xp };

        let inserted =
            CompletionRepository::family_insert(&mut tx, student_id, challenge_id, day, awarded)
                .await?;
        if !inserted {
            tx.rollback().await?;
            let mut conn = self.pool().acquire().await?;
            let prior = CompletionRepository::family_find(&mut conn, student_id, challenge_id, day)
                .await?
                .unwrap_or(0);
            return Ok(ActivityOutcome::duplicate(prior, student.total_xp));
        }

        let reason = format!("family_challenge:{}", challenge_id);
        let new_balance = if awarded > 0 {
            service::apply_delta(&mut tx, student_id, awarded, &reason).await?
        } else {
            student.total_xp
        };

        tx.commit().await?;

        info!(
            student_id = %student_id,
            challenge_id = %challenge_id,
            awarded = awarded,
            capped = capped,
            "Family challenge recorded"
        );

        Ok(ActivityOutcome {
            awarded,
            new_balance,
            capped,
            duplicate: false,
        })
    }

    /// Record a self-reported trust challenge: one rewarded submission
    /// per challenge type per day.
    pub async fn complete_trust_challenge(
        &self,
        student_id: &str,
        challenge_type: &str,
    ) -> LedgerResult<ActivityOutcome> {
        require_id("student_id", student_id)?;
        require_id("challenge_type", challenge_type)?;

        let day = period::today_utc();
        let mut tx = self.begin_serializable().await?;
        let student = Self::fetch_student(&mut tx, student_id).await?;

        if let Some(prior) =
            CompletionRepository::trust_find(&mut tx, student_id, challenge_type, day).await?
        {
            tx.rollback().await?;
            debug!(student_id = %student_id, challenge_type = %challenge_type, "Duplicate trust challenge");
            return Ok(ActivityOutcome::duplicate(prior, student.total_xp));
        }

        let awarded = self.awards.trust_challenge_xp;
        let inserted =
            CompletionRepository::trust_insert(&mut tx, student_id, challenge_type, day, awarded)
                .await?;
        if !inserted {
            tx.rollback().await?;
            let mut conn = self.pool().acquire().await?;
            let prior = CompletionRepository::trust_find(&mut conn, student_id, challenge_type, day)
                .await?
                .unwrap_or(0);
            return Ok(ActivityOutcome::duplicate(prior, student.total_xp));
        }

        let reason = format!("trust:{}", challenge_type);
        let new_balance = if awarded > 0 {
            service::apply_delta(&mut tx, student_id, awarded, &reason).await?
        } else {
            student.total_xp
        };

        tx.commit().await?;

        info!(student_id = %student_id, challenge_type = %challenge_type, awarded = awarded, "Trust challenge recorded");

        Ok(ActivityOutcome {
            awarded,
            new_balance,
            capped: false,
            duplicate: false,
        })
    }

    /// Record a weekly gauntlet submission. One submission per challenge
    /// per ISO week; the personal best and the cross-club points track
    /// the submitted score independently of the fixed XP reward.
    pub async fn complete_gauntlet(
        &self,
        student_id: &str,
        challenge_id: &str,
        score: i64,
    ) -> LedgerResult<ActivityOutcome> {
        require_id("student_id", student_id)?;
        require_id("challenge_id", challenge_id)?;

        if score < 0 {
            return Err(LedgerError::Validation(
                "gauntlet score must not be negative".to_string(),
            ));
        }

        let day = period::today_utc();
        let IsoWeek { year, week } = period::iso_week_of(day);

        let mut tx = self.begin_serializable().await?;
        let student = Self::fetch_student(&mut tx, student_id).await?;

        if let Some(prior) =
            CompletionRepository::gauntlet_find(&mut tx, student_id, challenge_id, year, week)
                .await?
        {
            tx.rollback().await?;
            debug!(student_id = %student_id, challenge_id = %challenge_id, "Duplicate gauntlet submission");
            return Ok(ActivityOutcome::duplicate(prior, student.total_xp));
        }

        let awarded = self.awards.gauntlet_xp;
        let inserted = CompletionRepository::gauntlet_insert(
            &mut tx,
            student_id,
            challenge_id,
            year,
            week,
            day,
            score,
            awarded,
        )
        .await?;
        if !inserted {
            tx.rollback().await?;
            let mut conn = self.pool().acquire().await?;
            let prior =
                CompletionRepository::gauntlet_find(&mut conn, student_id, challenge_id, year, week)
                    .await?
                    .unwrap_or(0);
            return Ok(ActivityOutcome::duplicate(prior, student.total_xp));
        }

        CompletionRepository::gauntlet_best_upsert(&mut tx, student_id, challenge_id, score).await?;

        let reason = format!("gauntlet:{}", challenge_id);
        let new_balance = if awarded > 0 {
            service::apply_delta(&mut tx, student_id, awarded, &reason).await?
        } else {
            student.total_xp
        };

        if score > 0 {
            service::apply_global_delta(
                &mut tx,
                student_id,
                score,
                XpTransactionType::PtsEarn,
                &reason,
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            student_id = %student_id,
            challenge_id = %challenge_id,
            score = score,
            awarded = awarded,
            "Gauntlet submission recorded"
        );

        Ok(ActivityOutcome {
            awarded,
            new_balance,
            capped: false,
            duplicate: false,
        })
    }

    /// Personal best for a gauntlet challenge, if any.
    pub async fn gauntlet_best(
        &self,
        student_id: &str,
        challenge_id: &str,
    ) -> LedgerResult<Option<i64>> {
        require_id("student_id", student_id)?;
        require_id("challenge_id", challenge_id)?;
        self.db.completions().gauntlet_best(student_id, challenge_id).await
    }

    /// Consecutive-day activity streak over all families.
    pub async fn streak(&self, student_id: &str) -> LedgerResult<u32> {
        require_id("student_id", student_id)?;

        if self.db.students().get(student_id).await?.is_none() {
            return Err(LedgerError::not_found("student", student_id));
        }

        let today = period::today_utc();
        let since = today - Duration::days(MAX_STREAK_DAYS as i64 + 1);
        let dates = self.db.completions().activity_dates(student_id, since).await?;
        let active: BTreeSet<_> = dates.into_iter().collect();

        Ok(streak_from(today, &active))
    }

    async fn lost_insert_race_habit(
        &self,
        tx: Transaction<'static, Postgres>,
        student_id: &str,
        habit_name: &str,
        day: chrono::NaiveDate,
    ) -> LedgerResult<ActivityOutcome> {
        tx.rollback().await?;
        let mut conn = self.pool().acquire().await?;
        let prior = CompletionRepository::habit_find(&mut conn, student_id, habit_name, day)
            .await?
            .unwrap_or(0);
        let balance = StudentRepository::fetch(&mut conn, student_id)
            .await?
            .map(|s| s.total_xp)
            .unwrap_or(0);
        Ok(ActivityOutcome::duplicate(prior, balance))
    }
}
