//! Trust tiers and threshold upgrades
//!
//! A student's tier is earned through consecutive coach-approved video
//! submissions and gates auto-approval eligibility. Any rejection drops
//! the student straight back to unverified - upgrades only ever happen
//! through approvals crossing the fixed thresholds.

use serde::{Deserialize, Serialize};

/// Standing of a student in the video moderation system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    /// No established trust; every submission goes to manual review
    #[default]
    Unverified,
    /// Eligible for auto-approval, subject to spot checks
    Verified,
    /// Long approval history; same auto-approval path as verified
    Trusted,
}

impl TrustTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Unverified => "unverified",
            TrustTier::Verified => "verified",
            TrustTier::Trusted => "trusted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unverified" => Some(TrustTier::Unverified),
            "verified" => Some(TrustTier::Verified),
            "trusted" => Some(TrustTier::Trusted),
            _ => None,
        }
    }

    /// Whether this tier qualifies for the auto-approval path
    pub fn auto_approval_eligible(&self) -> bool {
        matches!(self, TrustTier::Verified | TrustTier::Trusted)
    }
}

/// Approval-streak thresholds for tier upgrades
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Consecutive approvals required for verified
    pub verified_streak: i32,
    /// Consecutive approvals required for trusted
    pub trusted_streak: i32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            verified_streak: 10,
            trusted_streak: 25,
        }
    }
}

/// Tier a student holds after an approval brings their streak to `streak`.
///
/// Only upgrades: a verified student below the trusted threshold stays
/// verified. Downgrades happen exclusively through rejections, which reset
/// the tier outside this function.
pub fn tier_for_streak(current: TrustTier, streak: i32, thresholds: &TierThresholds) -> TrustTier {
    if streak >= thresholds.trusted_streak {
        TrustTier::Trusted
    } else if streak >= thresholds.verified_streak {
        TrustTier::Verified
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_round_trip() {
        for tier in [TrustTier::Unverified, TrustTier::Verified, TrustTier::Trusted] {
            assert_eq!(TrustTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(TrustTier::parse("banned"), None);
    }

    #[test]
    fn test_upgrade_thresholds() {
        let t = TierThresholds::default();

        assert_eq!(tier_for_streak(TrustTier::Unverified, 9, &t), TrustTier::Unverified);
        assert_eq!(tier_for_streak(TrustTier::Unverified, 10, &t), TrustTier::Verified);
        assert_eq!(tier_for_streak(TrustTier::Verified, 24, &t), TrustTier::Verified);
        assert_eq!(tier_for_streak(TrustTier::Verified, 25, &t), TrustTier::Trusted);
        assert_eq!(tier_for_streak(TrustTier::Trusted, 40, &t), TrustTier::Trusted);
    }

    #[test]
    fn test_no_downgrade_on_approval_path() {
        let t = TierThresholds::default();
        // A trusted student whose streak was externally reset keeps the
        // tier until a rejection resets it.
        assert_eq!(tier_for_streak(TrustTier::Trusted, 3, &t), TrustTier::Trusted);
    }

    #[test]
    fn test_auto_approval_eligibility() {
        assert!(!TrustTier::Unverified.auto_approval_eligible());
        assert!(TrustTier::Verified.auto_approval_eligible());
        assert!(TrustTier::Trusted.auto_approval_eligible());
    }
}
