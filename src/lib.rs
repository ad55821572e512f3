//! Dojo Ledger
//!
//! XP ledger and trust-tier moderation engine for the academy platform.
//! Grants gamification XP from independently submitted activity types
//! with exactly-once crediting, enforces per-period caps, auto-moderates
//! video evidence based on an evolving trust score, and reconciles the
//! cached balance against the append-only audit log so a displayed total
//! never regresses.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management (centralized awards)
//! ├── error.rs       - Error taxonomy
//! ├── ledger/        - Append-only XP ledger
//! │   ├── transaction.rs - Transaction types
//! │   ├── service.rs     - The single atomic mutation path
//! │   └── reconcile.rs   - max(cached, recomputed) read side
//! ├── activity/      - Activity gate
//! │   ├── gate.rs    - Idempotency keys and period caps
//! │   ├── period.rs  - UTC day / ISO week boundaries
//! │   └── streak.rs  - Consecutive-day streak walk
//! ├── moderation/    - Video moderation
//! │   ├── tier.rs        - Trust tiers and threshold upgrades
//! │   ├── fingerprint.rs - Duplicate/rate/duration heuristics
//! │   ├── submission.rs  - Submission types and terminal states
//! │   └── engine.rs      - Routing and coach decisions
//! ├── notify.rs      - Decision events for external consumers
//! ├── api/           - HTTP API endpoints
//! │   ├── activity.rs - Completion entry point
//! │   ├── video.rs    - Submission and decision entry points
//! │   └── status.rs   - Status and leaderboards via reconciliation
//! └── database/      - PostgreSQL persistence
//! ```

pub mod activity;
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod moderation;
pub mod notify;

// Re-export main types for convenience
pub use activity::{ActivityGate, ActivityOutcome};
pub use config::{AppConfig, AwardConfig, ModerationConfig};
pub use database::{DatabasePool, Student};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{
    LeaderboardEntry, LeaderboardScope, ReconciliationService, XpService, XpTransaction,
    XpTransactionType,
};
pub use moderation::{
    ContentFlag, FixedSampler, ModerationEngine, RandomSampler, ReviewDecision, SpotCheckSampler,
    TierThresholds, TrustTier, VideoStatus, VideoSubmission, VideoSubmissionRequest,
};
pub use notify::{NotificationBus, VideoDecisionEvent};

// Re-export API types
pub use api::{
    create_activity_router, create_status_router, create_video_router, ActivityApiState,
    StatusApiState, VideoApiState,
};
