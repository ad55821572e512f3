//! Database Connection Pool using sqlx
//!
//! The schema is applied once here, at startup. Request paths assume the
//! schema is complete and fail fast otherwise - no conditional column or
//! enum mutation ever happens per request.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::database::completions::CompletionRepository;
use crate::database::students::StudentRepository;
use crate::database::transactions::TransactionRepository;
use crate::database::videos::VideoRepository;
use crate::error::{LedgerError, LedgerResult};

pub struct DatabasePool {
    pool: PgPool,
    students: StudentRepository,
    transactions: TransactionRepository,
    completions: CompletionRepository,
    videos: VideoRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> LedgerResult<Self> {
        if connection_string.is_empty() {
            return Err(LedgerError::Misconfiguration(
                "PostgreSQL connection string is empty".to_string(),
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;

        info!("Connected to PostgreSQL");

        let students = StudentRepository::new(pool.clone());
        let transactions = TransactionRepository::new(pool.clone());
        let completions = CompletionRepository::new(pool.clone());
        let videos = VideoRepository::new(pool.clone());

        Ok(Self {
            pool,
            students,
            transactions,
            completions,
            videos,
        })
    }

    /// Apply the schema. Idempotent; runs exactly once per process start.
    pub async fn init_schema(&self) -> LedgerResult<()> {
        info!("Initializing ledger schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id VARCHAR(255) PRIMARY KEY,
                total_xp BIGINT NOT NULL DEFAULT 0,
                global_xp BIGINT NOT NULL DEFAULT 0,
                trust_tier VARCHAR(16) NOT NULL DEFAULT 'unverified',
                approval_streak INTEGER NOT NULL DEFAULT 0,
                rejection_count INTEGER NOT NULL DEFAULT 0,
                is_premium BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS xp_transactions (
                id BIGSERIAL PRIMARY KEY,
                student_id VARCHAR(255) NOT NULL REFERENCES students(id),
                amount BIGINT NOT NULL CHECK (amount > 0),
                tx_type VARCHAR(16) NOT NULL,
                reason TEXT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_xp_transactions_student
            ON xp_transactions(student_id, tx_type, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS habit_completions (
                id BIGSERIAL PRIMARY KEY,
                student_id VARCHAR(255) NOT NULL REFERENCES students(id),
                habit_name VARCHAR(255) NOT NULL,
                day DATE NOT NULL,
                awarded BIGINT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                UNIQUE (student_id, habit_name, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quiz_completions (
                id BIGSERIAL PRIMARY KEY,
                student_id VARCHAR(255) NOT NULL REFERENCES students(id),
                day DATE NOT NULL,
                correct BOOLEAN NOT NULL,
                awarded BIGINT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                UNIQUE (student_id, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS family_challenge_completions (
                id BIGSERIAL PRIMARY KEY,
                student_id VARCHAR(255) NOT NULL REFERENCES students(id),
                challenge_id VARCHAR(255) NOT NULL,
                day DATE NOT NULL,
                awarded BIGINT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                UNIQUE (student_id, challenge_id, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trust_challenge_completions (
                id BIGSERIAL PRIMARY KEY,
                student_id VARCHAR(255) NOT NULL REFERENCES students(id),
                challenge_type VARCHAR(64) NOT NULL,
                day DATE NOT NULL,
                awarded BIGINT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                UNIQUE (student_id, challenge_type, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gauntlet_completions (
                id BIGSERIAL PRIMARY KEY,
                student_id VARCHAR(255) NOT NULL REFERENCES students(id),
                challenge_id VARCHAR(255) NOT NULL,
                iso_year INTEGER NOT NULL,
                iso_week INTEGER NOT NULL,
                day DATE NOT NULL,
                score BIGINT NOT NULL,
                awarded BIGINT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                UNIQUE (student_id, challenge_id, iso_year, iso_week)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gauntlet_bests (
                id BIGSERIAL PRIMARY KEY,
                student_id VARCHAR(255) NOT NULL REFERENCES students(id),
                challenge_id VARCHAR(255) NOT NULL,
                best_score BIGINT NOT NULL,
                achieved_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                UNIQUE (student_id, challenge_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_submissions (
                id UUID PRIMARY KEY,
                student_id VARCHAR(255) NOT NULL REFERENCES students(id),
                challenge_id VARCHAR(255) NOT NULL,
                content_hash VARCHAR(64) NOT NULL,
                storage_key TEXT NOT NULL,
                duration_seconds DOUBLE PRECISION NOT NULL,
                status VARCHAR(16) NOT NULL,
                ai_flag VARCHAR(8) NOT NULL,
                ai_flag_reason TEXT,
                is_spot_check BOOLEAN NOT NULL DEFAULT FALSE,
                xp_value BIGINT NOT NULL,
                xp_awarded BIGINT NOT NULL DEFAULT 0,
                notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                decided_at TIMESTAMP WITH TIME ZONE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_video_submissions_hash
            ON video_submissions(content_hash, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_video_submissions_student
            ON video_submissions(student_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_video_submissions_status
            ON video_submissions(status, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Ledger schema initialized");
        Ok(())
    }

    pub fn students(&self) -> &StudentRepository {
        &self.students
    }

    pub fn transactions(&self) -> &TransactionRepository {
        &self.transactions
    }

    pub fn completions(&self) -> &CompletionRepository {
        &self.completions
    }

    pub fn videos(&self) -> &VideoRepository {
        &self.videos
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
