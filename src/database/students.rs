//! Student Repository - balance and trust fields
//!
//! Student rows are never deleted, only updated. The cached balances
//! (`total_xp`, `global_xp`) are owned by the XP application service and
//! must not be written by any other path; trust fields are owned by the
//! moderation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Row};
use tracing::error;

use crate::error::LedgerResult;
use crate::moderation::tier::TrustTier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    /// Cached club XP balance; read through reconciliation, never directly
    pub total_xp: i64,
    /// Cached cross-club score, same mutation discipline
    pub global_xp: i64,
    pub trust_tier: TrustTier,
    pub approval_streak: i32,
    pub rejection_count: i32,
    pub is_premium: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn student_from_row(row: &sqlx::postgres::PgRow) -> Student {
    let tier_str: String = row.get("trust_tier");
    let trust_tier = TrustTier::parse(&tier_str).unwrap_or_else(|| {
        error!(tier = %tier_str, "Unknown trust tier in store, treating as unverified");
        TrustTier::Unverified
    });

    Student {
        id: row.get("id"),
        total_xp: row.get("total_xp"),
        global_xp: row.get("global_xp"),
        trust_tier,
        approval_streak: row.get("approval_streak"),
        rejection_count: row.get("rejection_count"),
        is_premium: row.get("is_premium"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct StudentRepository {
    pool: PgPool,
}

impl StudentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a student if absent and return the stored row. Enrollment
    /// itself is handled by the surrounding CRUD layer; this exists for
    /// seeding and tests.
    pub async fn create(&self, id: &str, is_premium: bool) -> LedgerResult<Student> {
        sqlx::query(
            r#"
            INSERT INTO students (id, is_premium)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(is_premium)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM students WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(student_from_row(&row))
    }

    pub async fn get(&self, id: &str) -> LedgerResult<Option<Student>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Transaction-scoped fetch, used inside the gate's serializable unit.
    pub async fn fetch(conn: &mut PgConnection, id: &str) -> LedgerResult<Option<Student>> {
        let row = sqlx::query("SELECT * FROM students WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.as_ref().map(student_from_row))
    }

    /// Increment the approval streak, returning the new value.
    /// Returns None when the student does not exist.
    pub async fn record_approval(conn: &mut PgConnection, id: &str) -> LedgerResult<Option<i32>> {
        let row = sqlx::query(
            r#"
            UPDATE students
            SET approval_streak = approval_streak + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING approval_streak
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| r.get("approval_streak")))
    }

    /// A rejection resets the streak and the tier in one statement.
    pub async fn record_rejection(conn: &mut PgConnection, id: &str) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE students
            SET approval_streak = 0,
                rejection_count = rejection_count + 1,
                trust_tier = 'unverified',
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_tier(conn: &mut PgConnection, id: &str, tier: TrustTier) -> LedgerResult<()> {
        sqlx::query("UPDATE students SET trust_tier = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(tier.as_str())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Opportunistic cache repair: raise the cached club balance to the
    /// reconciled candidate, never lower it. Safe to lose - the next read
    /// recomputes the same maximum.
    pub async fn patch_total_xp_floor(&self, id: &str, candidate: i64) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE students
            SET total_xp = GREATEST(total_xp, $2), updated_at = NOW()
            WHERE id = $1 AND total_xp < $2
            "#,
        )
        .bind(id)
        .bind(candidate)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Same repair for the cross-club score.
    pub async fn patch_global_xp_floor(&self, id: &str, candidate: i64) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE students
            SET global_xp = GREATEST(global_xp, $2), updated_at = NOW()
            WHERE id = $1 AND global_xp < $2
            "#,
        )
        .bind(id)
        .bind(candidate)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
