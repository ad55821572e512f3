//! Activity Gate and derived activity state
//!
//! The gate enforces one reward per idempotency key per period and the
//! per-period caps; the streak calculator derives consecutive-day
//! activity from the completion records the gate leaves behind.

pub mod gate;
pub mod period;
pub mod streak;

pub use gate::{ActivityGate, ActivityOutcome};
pub use period::IsoWeek;
pub use streak::streak_from;
