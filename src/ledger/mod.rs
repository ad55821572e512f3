//! XP Ledger
//!
//! The append-only transaction log, the single mutation path over it,
//! and the reconciling read side.
//!
//! ## Write discipline
//!
//! - Balances change only through [`service::apply_delta`] and
//!   [`service::apply_global_delta`].
//! - Each change appends exactly one transaction row in the same atomic
//!   unit.
//!
//! ## Read discipline
//!
//! - Displayed balances always come from [`ReconciliationService`]:
//!   max(cached, recomputed), so a displayed total never regresses.

pub mod reconcile;
pub mod service;
pub mod transaction;

pub use reconcile::{LeaderboardEntry, LeaderboardScope, ReconciliationService};
pub use service::XpService;
pub use transaction::{XpTransaction, XpTransactionType};
