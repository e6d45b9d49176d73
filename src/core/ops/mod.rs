//! core::ops
//!
//! Operation journaling and locking.
//!
//! # Modules
//!
//! - [`journal`] - Operation journal for compensating rollback
//! - [`lock`] - Per-scope exclusive locks
//!
//! # Architecture
//!
//! Every mutating tree operation:
//! 1. Acquires the locks of every scope it touches (via the store's `begin`)
//! 2. Creates a journal before the first bounds change
//! 3. Records each applied primitive
//! 4. On success: marks the journal committed and commits
//! 5. On failure: compensates from the journal, then rolls back

pub mod journal;
pub mod lock;

// Re-export main types for convenience
pub use journal::{Journal, JournalStep, OpId, OpPhase, StepKind};
pub use lock::{LockError, ScopeLock, ScopeLockTable};
