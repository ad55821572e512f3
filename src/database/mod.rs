//! PostgreSQL persistence
//!
//! Repositories for students, the append-only transaction log, the
//! per-family completion records, and video submissions. Operations that
//! must share a caller's transaction take `&mut PgConnection`; read paths
//! run on the pool.

pub mod completions;
pub mod pool;
pub mod students;
pub mod transactions;
pub mod videos;

pub use completions::CompletionRepository;
pub use pool::DatabasePool;
pub use students::{Student, StudentRepository};
pub use transactions::TransactionRepository;
pub use videos::VideoRepository;
