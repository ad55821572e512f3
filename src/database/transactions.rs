//! Transaction Repository - the append-only XP audit log
//!
//! Rows are inserted exactly once and never updated or deleted. All sums
//! used by reconciliation come from here.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Row};
use tracing::error;

use crate::error::LedgerResult;
use crate::ledger::transaction::{XpTransaction, XpTransactionType};

pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one ledger row. Runs on the caller's connection so the
    /// insert shares the atomic unit with its balance update.
    pub async fn insert(
        conn: &mut PgConnection,
        student_id: &str,
        amount: i64,
        tx_type: XpTransactionType,
        reason: &str,
    ) -> LedgerResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO xp_transactions (student_id, amount, tx_type, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(student_id)
        .bind(amount)
        .bind(tx_type.as_str())
        .bind(reason)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.get("id"))
    }

    /// Sum of club EARN magnitudes, optionally restricted to rows at or
    /// after `since`.
    pub async fn sum_club_earned(
        &self,
        student_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> LedgerResult<i64> {
        // SUM over BIGINT widens to NUMERIC in Postgres; cast back down.
        let sum: i64 = match since {
            Some(since) => {
                sqlx::query_scalar(
                    r#"
                    SELECT COALESCE(SUM(amount), 0)::BIGINT FROM xp_transactions
                    WHERE student_id = $1 AND tx_type = 'EARN' AND created_at >= $2
                    "#,
                )
                .bind(student_id)
                .bind(since)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    SELECT COALESCE(SUM(amount), 0)::BIGINT FROM xp_transactions
                    WHERE student_id = $1 AND tx_type = 'EARN'
                    "#,
                )
                .bind(student_id)
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(sum)
    }

    /// Sum of cross-club grant magnitudes (GLOBAL_EARN and PTS_EARN).
    pub async fn sum_global_earned(&self, student_id: &str) -> LedgerResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT FROM xp_transactions
            WHERE student_id = $1 AND tx_type IN ('GLOBAL_EARN', 'PTS_EARN')
            "#,
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    /// Most recent ledger rows for a student, newest first.
    pub async fn history(&self, student_id: &str, limit: i64) -> LedgerResult<Vec<XpTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, amount, tx_type, reason, created_at
            FROM xp_transactions
            WHERE student_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(student_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows {
            let type_str: String = row.get("tx_type");
            let tx_type = match XpTransactionType::parse(&type_str) {
                Some(t) => t,
                None => {
                    error!(tx_type = %type_str, "Unknown transaction type in store, skipping row");
                    continue;
                }
            };

            transactions.push(XpTransaction {
                id: row.get("id"),
                student_id: row.get("student_id"),
                amount: row.get("amount"),
                tx_type,
                reason: row.get("reason"),
                created_at: row.get("created_at"),
            });
        }

        Ok(transactions)
    }

    /// Count of EARN rows for a student and reason tag. Used by tests and
    /// audits to assert exactly-once crediting.
    pub async fn count_earns_for_reason(
        &self,
        student_id: &str,
        reason: &str,
    ) -> LedgerResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM xp_transactions
            WHERE student_id = $1 AND tx_type = 'EARN' AND reason = $2
            "#,
        )
        .bind(student_id)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
