//! Video Repository - submission rows and fingerprint lookbacks

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Row};
use tracing::error;
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::moderation::fingerprint::ContentFlag;
use crate::moderation::submission::{VideoStatus, VideoSubmission};

fn submission_from_row(row: &sqlx::postgres::PgRow) -> VideoSubmission {
    let status_str: String = row.get("status");
    let status = VideoStatus::parse(&status_str).unwrap_or_else(|| {
        error!(status = %status_str, "Unknown video status in store, treating as PENDING");
        VideoStatus::Pending
    });

    let flag_str: String = row.get("ai_flag");
    let ai_flag = ContentFlag::parse(&flag_str).unwrap_or_else(|| {
        error!(flag = %flag_str, "Unknown content flag in store, treating as red");
        ContentFlag::Red
    });

    VideoSubmission {
        id: row.get("id"),
        student_id: row.get("student_id"),
        challenge_id: row.get("challenge_id"),
        content_hash: row.get("content_hash"),
        storage_key: row.get("storage_key"),
        duration_seconds: row.get("duration_seconds"),
        status,
        ai_flag,
        ai_flag_reason: row.get("ai_flag_reason"),
        is_spot_check: row.get("is_spot_check"),
        xp_value: row.get("xp_value"),
        xp_awarded: row.get("xp_awarded"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        decided_at: row.get("decided_at"),
    }
}

pub struct VideoRepository {
    pool: PgPool,
}

impl VideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(conn: &mut PgConnection, sub: &VideoSubmission) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO video_submissions
                (id, student_id, challenge_id, content_hash, storage_key, duration_seconds,
                 status, ai_flag, ai_flag_reason, is_spot_check, xp_value, xp_awarded,
                 notes, created_at, decided_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(sub.id)
        .bind(&sub.student_id)
        .bind(&sub.challenge_id)
        .bind(&sub.content_hash)
        .bind(&sub.storage_key)
        .bind(sub.duration_seconds)
        .bind(sub.status.as_str())
        .bind(sub.ai_flag.as_str())
        .bind(&sub.ai_flag_reason)
        .bind(sub.is_spot_check)
        .bind(sub.xp_value)
        .bind(sub.xp_awarded)
        .bind(&sub.notes)
        .bind(sub.created_at)
        .bind(sub.decided_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> LedgerResult<Option<VideoSubmission>> {
        let row = sqlx::query("SELECT * FROM video_submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(submission_from_row))
    }

    /// Row-locked fetch for the decision path; blocks a concurrent
    /// decision on the same submission until this transaction settles.
    pub async fn fetch_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> LedgerResult<Option<VideoSubmission>> {
        let row = sqlx::query("SELECT * FROM video_submissions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.as_ref().map(submission_from_row))
    }

    /// Move a submission into a terminal state.
    pub async fn mark_decided(
        conn: &mut PgConnection,
        id: Uuid,
        status: VideoStatus,
        xp_awarded: i64,
        notes: Option<&str>,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE video_submissions
            SET status = $2, xp_awarded = $3, notes = COALESCE($4, notes), decided_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(xp_awarded)
        .bind(notes)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Whether any submission carries this content hash at or after `since`.
    pub async fn exists_hash_since(
        conn: &mut PgConnection,
        content_hash: &str,
        since: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM video_submissions
            WHERE content_hash = $1 AND created_at >= $2
            "#,
        )
        .bind(content_hash)
        .bind(since)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count > 0)
    }

    /// Submissions by the student at or after `since`.
    pub async fn count_student_since(
        conn: &mut PgConnection,
        student_id: &str,
        since: DateTime<Utc>,
    ) -> LedgerResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM video_submissions
            WHERE student_id = $1 AND created_at >= $2
            "#,
        )
        .bind(student_id)
        .bind(since)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    /// Oldest-first review queue for coaches.
    pub async fn list_pending(&self, limit: i64) -> LedgerResult<Vec<VideoSubmission>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM video_submissions
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(submission_from_row).collect())
    }
}
