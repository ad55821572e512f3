//! XP transaction types
//!
//! Transactions are the append-only audit trail behind every balance
//! change. A row is created once and never mutated or deleted; the cached
//! balances on the student row are derived state that reconciliation can
//! always rebuild from these rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum XpTransactionType {
    /// Club XP grant - the only type reconciliation sums for `total_xp`
    Earn,
    /// Club XP deduction
    Spend,
    /// Gauntlet competition points on the cross-club score
    PtsEarn,
    /// Cross-club score grant mirroring an approved video reward
    GlobalEarn,
}

impl XpTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            XpTransactionType::Earn => "EARN",
            XpTransactionType::Spend => "SPEND",
            XpTransactionType::PtsEarn => "PTS_EARN",
            XpTransactionType::GlobalEarn => "GLOBAL_EARN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EARN" => Some(XpTransactionType::Earn),
            "SPEND" => Some(XpTransactionType::Spend),
            "PTS_EARN" => Some(XpTransactionType::PtsEarn),
            "GLOBAL_EARN" => Some(XpTransactionType::GlobalEarn),
            _ => None,
        }
    }

    /// Whether this type mutates the cross-club score rather than club XP
    pub fn is_global(&self) -> bool {
        matches!(self, XpTransactionType::PtsEarn | XpTransactionType::GlobalEarn)
    }
}

/// One append-only ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpTransaction {
    pub id: i64,
    pub student_id: String,
    /// Magnitude of the change, always >= 1; the sign lives in `tx_type`
    pub amount: i64,
    pub tx_type: XpTransactionType,
    /// Free-text activity tag, e.g. `habit:pushups` or `video:kata-3`
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
