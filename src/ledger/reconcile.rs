//! Reconciliation Service - the only read path for balances
//!
//! Every displayed balance is `max(cached, recomputed from the log)`, so
//! a stale cache never shows a lower value than a caller has already
//! seen. When the recomputed value wins, the cache is patched
//! opportunistically; losing that patch is harmless because the next
//! read recomputes the same maximum.

use chrono::Utc;
use serde::Serialize;
use sqlx::Row;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::activity::period::month_start;
use crate::database::students::Student;
use crate::database::DatabasePool;
use crate::error::{require_id, LedgerError, LedgerResult};

/// Which transaction population a leaderboard ranks over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardScope {
    Monthly,
    Lifetime,
    Global,
}

impl LeaderboardScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(LeaderboardScope::Monthly),
            "lifetime" => Some(LeaderboardScope::Lifetime),
            "global" => Some(LeaderboardScope::Global),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub student_id: String,
    pub xp: i64,
}

pub struct ReconciliationService {
    db: Arc<DatabasePool>,
}

impl ReconciliationService {
    pub fn new(db: Arc<DatabasePool>) -> Self {
        Self { db }
    }

    async fn student(&self, student_id: &str) -> LedgerResult<Student> {
        self.db
            .students()
            .get(student_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("student", student_id))
    }

    /// Lifetime club XP: max(cached, Σ EARN all-time), patching the cache
    /// when the recomputed sum wins.
    pub async fn lifetime_xp(&self, student_id: &str) -> LedgerResult<i64> {
        require_id("student_id", student_id)?;

        let student = self.student(student_id).await?;
        let earned = self.db.transactions().sum_club_earned(student_id, None).await?;
        let candidate = student.total_xp.max(earned);

        if candidate > student.total_xp {
            debug!(
                student_id = %student_id,
                cached = student.total_xp,
                recomputed = earned,
                "Cached balance behind the log, patching"
            );
            if let Err(e) = self.db.students().patch_total_xp_floor(student_id, candidate).await {
                // Best-effort repair; the next read recomputes the same value.
                warn!(student_id = %student_id, error = %e, "Opportunistic balance patch failed");
            }
        }

        Ok(candidate)
    }

    /// Club XP earned in the current UTC calendar month. A student whose
    /// record was created within the month floors this at the all-time
    /// cached balance - pre-ledger-era XP counts as earned this month.
    pub async fn monthly_xp(&self, student_id: &str) -> LedgerResult<i64> {
        require_id("student_id", student_id)?;

        let start = month_start(Utc::now());
        let student = self.student(student_id).await?;
        let earned = self
            .db
            .transactions()
            .sum_club_earned(student_id, Some(start))
            .await?;

        if student.created_at >= start {
            Ok(student.total_xp.max(earned))
        } else {
            Ok(earned)
        }
    }

    /// Cross-club score: max(cached, Σ GLOBAL_EARN + PTS_EARN), with the
    /// same opportunistic repair as the club balance.
    pub async fn global_xp(&self, student_id: &str) -> LedgerResult<i64> {
        require_id("student_id", student_id)?;

        let student = self.student(student_id).await?;
        let earned = self.db.transactions().sum_global_earned(student_id).await?;
        let candidate = student.global_xp.max(earned);

        if candidate > student.global_xp {
            if let Err(e) = self.db.students().patch_global_xp_floor(student_id, candidate).await {
                warn!(student_id = %student_id, error = %e, "Opportunistic global-score patch failed");
            }
        }

        Ok(candidate)
    }

    /// Leaderboards are computed on read with the reconciliation rule
    /// pushed into SQL; the raw cache is never ranked directly.
    pub async fn leaderboard(
        &self,
        scope: LeaderboardScope,
        limit: i64,
    ) -> LedgerResult<Vec<LeaderboardEntry>> {
        let limit = limit.clamp(1, 500);

        let rows = match scope {
            LeaderboardScope::Lifetime => {
                sqlx::query(
                    r#"
                    SELECT s.id, GREATEST(s.total_xp, COALESCE(SUM(t.amount), 0))::BIGINT AS xp
                    FROM students s
                    LEFT JOIN xp_transactions t
                        ON t.student_id = s.id AND t.tx_type = 'EARN'
                    GROUP BY s.id, s.total_xp
                    ORDER BY xp DESC, s.id ASC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            LeaderboardScope::Monthly => {
                let start = month_start(Utc::now());
                sqlx::query(
                    r#"
                    SELECT s.id,
                           (CASE WHEN s.created_at >= $1
                                 THEN GREATEST(s.total_xp, COALESCE(SUM(t.amount), 0))
                                 ELSE COALESCE(SUM(t.amount), 0)
                            END)::BIGINT AS xp
                    FROM students s
                    LEFT JOIN xp_transactions t
                        ON t.student_id = s.id
                       AND t.tx_type = 'EARN'
                       AND t.created_at >= $1
                    GROUP BY s.id, s.total_xp, s.created_at
                    ORDER BY xp DESC, s.id ASC
                    LIMIT $2
                    "#,
                )
                .bind(start)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            LeaderboardScope::Global => {
                sqlx::query(
                    r#"
                    SELECT s.id, GREATEST(s.global_xp, COALESCE(SUM(t.amount), 0))::BIGINT AS xp
                    FROM students s
                    LEFT JOIN xp_transactions t
                        ON t.student_id = s.id
                       AND t.tx_type IN ('GLOBAL_EARN', 'PTS_EARN')
                    GROUP BY s.id, s.global_xp
                    ORDER BY xp DESC, s.id ASC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| LeaderboardEntry {
                student_id: row.get("id"),
                xp: row.get("xp"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        assert_eq!(LeaderboardScope::parse("monthly"), Some(LeaderboardScope::Monthly));
        assert_eq!(LeaderboardScope::parse("lifetime"), Some(LeaderboardScope::Lifetime));
        assert_eq!(LeaderboardScope::parse("global"), Some(LeaderboardScope::Global));
        assert_eq!(LeaderboardScope::parse("weekly"), None);
    }
}
