//! Video moderation
//!
//! Trust tiers, content fingerprint heuristics, and the engine that
//! routes submissions between auto-approval and manual review.
//!
//! ## Routing matrix
//!
//! | Flag | Tier | Route |
//! |------|------|-------|
//! | red / yellow | any | manual review |
//! | green | unverified | manual review |
//! | green | verified / trusted | auto-approve, 1-in-10 spot check |
//!
//! Approvals grow the approval streak and upgrade the tier at fixed
//! thresholds; a single rejection resets both.

pub mod engine;
pub mod fingerprint;
pub mod submission;
pub mod tier;

pub use engine::{
    DecisionOutcome, FixedSampler, ModerationEngine, RandomSampler, SpotCheckSampler,
    SubmissionRoute,
};
pub use fingerprint::{ContentFlag, FingerprintContext, FingerprintLimits, FlagVerdict};
pub use submission::{ReviewDecision, VideoStatus, VideoSubmission, VideoSubmissionRequest};
pub use tier::{tier_for_streak, TierThresholds, TrustTier};
