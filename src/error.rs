//! Error taxonomy for the ledger core
//!
//! Duplicate submissions and reached caps are NOT errors - they are
//! success-shaped outcomes carried by `ActivityOutcome`. Only conditions
//! that abort a request live here.

use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed or missing identifiers - rejected before any store access.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced entity does not exist. No mutation was attempted.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A decision was requested on a submission already in a terminal state.
    #[error("submission {0} already decided")]
    AlreadyDecided(String),

    /// Store-level failure. The enclosing transaction was rolled back in
    /// full; serialization conflicts are retryable.
    #[error("store failure: {0}")]
    Store(#[from] sqlx::Error),

    /// A correctness-critical dependency is absent or invalid.
    #[error("misconfiguration: {0}")]
    Misconfiguration(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether the caller may safely retry the request.
    ///
    /// Postgres reports serialization conflicts under SQLSTATE 40001 and
    /// deadlocks under 40P01; both leave no partial state behind.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Store(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}

/// Reject empty or oversized identifiers before touching the store.
pub fn require_id(field: &'static str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::Validation(format!("{} must not be empty", field)));
    }
    if value.len() > 255 {
        return Err(LedgerError::Validation(format!(
            "{} exceeds 255 characters",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_id() {
        assert!(require_id("student_id", "stu_1").is_ok());
        assert!(require_id("student_id", "").is_err());
        assert!(require_id("student_id", "   ").is_err());
        assert!(require_id("student_id", &"x".repeat(256)).is_err());
    }

    #[test]
    fn test_not_found_message() {
        let err = LedgerError::not_found("student", "stu_1");
        assert_eq!(err.to_string(), "student stu_1 not found");
    }

    #[test]
    fn test_non_store_errors_not_retryable() {
        assert!(!LedgerError::Validation("bad".to_string()).is_retryable());
        assert!(!LedgerError::AlreadyDecided("v1".to_string()).is_retryable());
    }
}
