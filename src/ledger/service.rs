//! XP Application Service - the only legal path for balance changes
//!
//! Every cached-balance change pairs with exactly one appended
//! transaction row inside the caller's atomic unit. The connection-level
//! functions compose into the activity gate's serializable transactions;
//! `XpService` wraps them in a transaction of their own for standalone
//! callers.

use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use tracing::debug;

use crate::database::transactions::TransactionRepository;
use crate::error::{require_id, LedgerError, LedgerResult};
use crate::ledger::transaction::XpTransactionType;

/// Apply a signed delta to the student's club XP balance.
///
/// - `amount == 0`: no-op; returns the current balance and writes no row.
/// - `amount > 0`: balance increment plus one EARN row.
/// - `amount < 0`: balance decrement plus one SPEND row of `abs(amount)`.
///
/// A missing student is `NotFound`, never a silent success.
pub async fn apply_delta(
    conn: &mut PgConnection,
    student_id: &str,
    amount: i64,
    reason: &str,
) -> LedgerResult<i64> {
    require_id("student_id", student_id)?;
    require_id("reason", reason)?;

    if amount == 0 {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT total_xp FROM students WHERE id = $1")
                .bind(student_id)
                .fetch_optional(&mut *conn)
                .await?;

        return balance.ok_or_else(|| LedgerError::not_found("student", student_id));
    }

    let new_balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE students
        SET total_xp = total_xp + $2, updated_at = NOW()
        WHERE id = $1
        RETURNING total_xp
        "#,
    )
    .bind(student_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;

    let new_balance =
        new_balance.ok_or_else(|| LedgerError::not_found("student", student_id))?;

    let tx_type = if amount > 0 {
        XpTransactionType::Earn
    } else {
        XpTransactionType::Spend
    };

    TransactionRepository::insert(conn, student_id, amount.abs(), tx_type, reason).await?;

    debug!(
        student_id = %student_id,
        amount = amount,
        reason = %reason,
        new_balance = new_balance,
        "Applied XP delta"
    );

    Ok(new_balance)
}

/// Apply a grant to the student's cross-club score. Only positive deltas
/// are legal here; the type distinguishes mirrored video rewards
/// (GLOBAL_EARN) from gauntlet competition points (PTS_EARN).
pub async fn apply_global_delta(
    conn: &mut PgConnection,
    student_id: &str,
    amount: i64,
    tx_type: XpTransactionType,
    reason: &str,
) -> LedgerResult<i64> {
    require_id("student_id", student_id)?;
    require_id("reason", reason)?;

    if !tx_type.is_global() {
        return Err(LedgerError::Validation(format!(
            "{} is not a cross-club transaction type",
            tx_type.as_str()
        )));
    }

    if amount < 0 {
        return Err(LedgerError::Validation(
            "cross-club score deltas must not be negative".to_string(),
        ));
    }

    if amount == 0 {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT global_xp FROM students WHERE id = $1")
                .bind(student_id)
                .fetch_optional(&mut *conn)
                .await?;

        return balance.ok_or_else(|| LedgerError::not_found("student", student_id));
    }

    let new_balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE students
        SET global_xp = global_xp + $2, updated_at = NOW()
        WHERE id = $1
        RETURNING global_xp
        "#,
    )
    .bind(student_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;

    let new_balance =
        new_balance.ok_or_else(|| LedgerError::not_found("student", student_id))?;

    TransactionRepository::insert(conn, student_id, amount, tx_type, reason).await?;

    debug!(
        student_id = %student_id,
        amount = amount,
        tx_type = %tx_type.as_str(),
        "Applied cross-club delta"
    );

    Ok(new_balance)
}

/// Pool-level wrapper opening its own transaction per call.
pub struct XpService {
    pool: PgPool,
}

impl XpService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn apply_delta(
        &self,
        student_id: &str,
        amount: i64,
        reason: &str,
    ) -> LedgerResult<i64> {
        let mut tx = self.pool.begin().await?;
        let new_balance = apply_delta(&mut tx, student_id, amount, reason).await?;
        tx.commit().await?;
        Ok(new_balance)
    }

    pub async fn apply_global_delta(
        &self,
        student_id: &str,
        amount: i64,
        tx_type: XpTransactionType,
        reason: &str,
    ) -> LedgerResult<i64> {
        let mut tx = self.pool.begin().await?;
        let new_balance = apply_global_delta(&mut tx, student_id, amount, tx_type, reason).await?;
        tx.commit().await?;
        Ok(new_balance)
    }
}
