//! Completion Repository - per-family activity completion records
//!
//! One table per activity family, each carrying the family's idempotency
//! key as a UNIQUE constraint. Existence of a row is the idempotency
//! proof; the row also stores the XP actually awarded (zero when a cap
//! was hit), which later calls report back unchanged.
//!
//! All reward-path operations take the caller's connection so the
//! existence check and the insert share one serializable transaction.

use chrono::NaiveDate;
use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Row};

use crate::error::LedgerResult;

pub struct CompletionRepository {
    pool: PgPool,
}

impl CompletionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Habits: key (student, habit_name), period = UTC day

    pub async fn habit_find(
        conn: &mut PgConnection,
        student_id: &str,
        habit_name: &str,
        day: NaiveDate,
    ) -> LedgerResult<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT awarded FROM habit_completions
            WHERE student_id = $1 AND habit_name = $2 AND day = $3
            "#,
        )
        .bind(student_id)
        .bind(habit_name)
        .bind(day)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| r.get("awarded")))
    }

    /// Total habit XP already awarded to the student on `day`.
    pub async fn habit_day_total(
        conn: &mut PgConnection,
        student_id: &str,
        day: NaiveDate,
    ) -> LedgerResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(awarded), 0)::BIGINT FROM habit_completions WHERE student_id = $1 AND day = $2",
        )
        .bind(student_id)
        .bind(day)
        .fetch_one(&mut *conn)
        .await?;

        Ok(sum)
    }

    /// Returns false when the idempotency key already exists.
    pub async fn habit_insert(
        conn: &mut PgConnection,
        student_id: &str,
        habit_name: &str,
        day: NaiveDate,
        awarded: i64,
    ) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO habit_completions (student_id, habit_name, day, awarded)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, habit_name, day) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(habit_name)
        .bind(day)
        .bind(awarded)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Daily quiz: key (student), period = UTC day

    pub async fn quiz_find(
        conn: &mut PgConnection,
        student_id: &str,
        day: NaiveDate,
    ) -> LedgerResult<Option<i64>> {
        let row = sqlx::query(
            "SELECT awarded FROM quiz_completions WHERE student_id = $1 AND day = $2",
        )
        .bind(student_id)
        .bind(day)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| r.get("awarded")))
    }

    pub async fn quiz_insert(
        conn: &mut PgConnection,
        student_id: &str,
        day: NaiveDate,
        correct: bool,
        awarded: i64,
    ) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO quiz_completions (student_id, day, correct, awarded)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, day) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(day)
        .bind(correct)
        .bind(awarded)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Family challenges: key (student, challenge_id), period = UTC day,
    // plus a daily cap on distinct challenges

    pub async fn family_find(
        conn: &mut PgConnection,
        student_id: &str,
        challenge_id: &str,
        day: NaiveDate,
    ) -> LedgerResult<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT awarded FROM family_challenge_completions
            WHERE student_id = $1 AND challenge_id = $2 AND day = $3
            "#,
        )
        .bind(student_id)
        .bind(challenge_id)
        .bind(day)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| r.get("awarded")))
    }

    /// Distinct family challenges the student completed on `day`.
    pub async fn family_count_day(
        conn: &mut PgConnection,
        student_id: &str,
        day: NaiveDate,
    ) -> LedgerResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM family_challenge_completions
            WHERE student_id = $1 AND day = $2
            "#,
        )
        .bind(student_id)
        .bind(day)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    pub async fn family_insert(
        conn: &mut PgConnection,
        student_id: &str,
        challenge_id: &str,
        day: NaiveDate,
        awarded: i64,
    ) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO family_challenge_completions (student_id, challenge_id, day, awarded)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, challenge_id, day) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(challenge_id)
        .bind(day)
        .bind(awarded)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Trust self-reports: key (student, challenge_type), period = UTC day

    pub async fn trust_find(
        conn: &mut PgConnection,
        student_id: &str,
        challenge_type: &str,
        day: NaiveDate,
    ) -> LedgerResult<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT awarded FROM trust_challenge_completions
            WHERE student_id = $1 AND challenge_type = $2 AND day = $3
            "#,
        )
        .bind(student_id)
        .bind(challenge_type)
        .bind(day)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| r.get("awarded")))
    }

    pub async fn trust_insert(
        conn: &mut PgConnection,
        student_id: &str,
        challenge_type: &str,
        day: NaiveDate,
        awarded: i64,
    ) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO trust_challenge_completions (student_id, challenge_type, day, awarded)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, challenge_type, day) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(challenge_type)
        .bind(day)
        .bind(awarded)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Gauntlet: key (student, challenge_id), period = ISO week

    pub async fn gauntlet_find(
        conn: &mut PgConnection,
        student_id: &str,
        challenge_id: &str,
        iso_year: i32,
        iso_week: i32,
    ) -> LedgerResult<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT awarded FROM gauntlet_completions
            WHERE student_id = $1 AND challenge_id = $2 AND iso_year = $3 AND iso_week = $4
            "#,
        )
        .bind(student_id)
        .bind(challenge_id)
        .bind(iso_year)
        .bind(iso_week)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| r.get("awarded")))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn gauntlet_insert(
        conn: &mut PgConnection,
        student_id: &str,
        challenge_id: &str,
        iso_year: i32,
        iso_week: i32,
        day: NaiveDate,
        score: i64,
        awarded: i64,
    ) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO gauntlet_completions
                (student_id, challenge_id, iso_year, iso_week, day, score, awarded)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (student_id, challenge_id, iso_year, iso_week) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(challenge_id)
        .bind(iso_year)
        .bind(iso_week)
        .bind(day)
        .bind(score)
        .bind(awarded)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Raise the stored personal best, never lower it.
    pub async fn gauntlet_best_upsert(
        conn: &mut PgConnection,
        student_id: &str,
        challenge_id: &str,
        score: i64,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO gauntlet_bests (student_id, challenge_id, best_score, achieved_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (student_id, challenge_id) DO UPDATE SET
                best_score = GREATEST(gauntlet_bests.best_score, EXCLUDED.best_score),
                achieved_at = CASE
                    WHEN EXCLUDED.best_score > gauntlet_bests.best_score THEN EXCLUDED.achieved_at
                    ELSE gauntlet_bests.achieved_at
                END
            "#,
        )
        .bind(student_id)
        .bind(challenge_id)
        .bind(score)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn gauntlet_best(
        &self,
        student_id: &str,
        challenge_id: &str,
    ) -> LedgerResult<Option<i64>> {
        let row = sqlx::query(
            "SELECT best_score FROM gauntlet_bests WHERE student_id = $1 AND challenge_id = $2",
        )
        .bind(student_id)
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("best_score")))
    }

    /// Distinct UTC dates with at least one qualifying completion in any
    /// family, bounded to the streak horizon. Input to the streak walk.
    pub async fn activity_dates(
        &self,
        student_id: &str,
        since: NaiveDate,
    ) -> LedgerResult<Vec<NaiveDate>> {
        let rows = sqlx::query(
            r#"
            SELECT day FROM habit_completions WHERE student_id = $1 AND day >= $2
            UNION
            SELECT day FROM quiz_completions WHERE student_id = $1 AND day >= $2
            UNION
            SELECT day FROM family_challenge_completions WHERE student_id = $1 AND day >= $2
            UNION
            SELECT day FROM trust_challenge_completions WHERE student_id = $1 AND day >= $2
            UNION
            SELECT day FROM gauntlet_completions WHERE student_id = $1 AND day >= $2
            "#,
        )
        .bind(student_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("day")).collect())
    }
}
