//! core::ops::lock
//!
//! Per-scope exclusive locks for tree mutations.
//!
//! # Architecture
//!
//! Bounds updates are computed from the current state of a scope, so two
//! writers in the same scope would each shift rows the other has already
//! shifted. The lock table serializes writers per scope while leaving
//! different scopes free to run in parallel.
//!
//! # Invariants
//!
//! - A guard holds all of its scopes or none of them
//! - Lock is automatically released on drop (RAII pattern)
//! - `acquire` blocks, `try_acquire` fails fast
//!
//! # Example
//!
//! ```
//! use nestedset::core::ops::lock::ScopeLockTable;
//! use nestedset::core::types::Scope;
//!
//! let table = ScopeLockTable::new();
//! let lock = table.acquire(&[Scope::FIRST]).unwrap();
//! assert!(table.is_locked(Scope::FIRST));
//!
//! // Lock automatically released when dropped
//! drop(lock);
//! assert!(!table.is_locked(Scope::FIRST));
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use thiserror::Error;

use crate::core::types::Scope;

/// Errors from locking operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Another writer already holds the scope.
    #[error("scope {0} is locked by another operation")]
    AlreadyLocked(Scope),

    /// A thread panicked while holding the table.
    #[error("scope lock table is poisoned")]
    Poisoned,
}

/// Registry of locked scopes, shared by every handle of one store.
#[derive(Debug, Default)]
pub struct ScopeLockTable {
    held: Mutex<HashSet<Scope>>,
    released: Condvar,
}

impl ScopeLockTable {
    /// Create an empty lock table.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn held(&self) -> Result<MutexGuard<'_, HashSet<Scope>>, LockError> {
        self.held.lock().map_err(|_| LockError::Poisoned)
    }

    /// Acquire every scope in `scopes`, blocking until all are free.
    ///
    /// Scopes are taken together, so two writers that need overlapping
    /// sets cannot deadlock each other.
    pub fn acquire(self: &Arc<Self>, scopes: &[Scope]) -> Result<ScopeLock, LockError> {
        let scopes = normalize(scopes);
        let mut held = self.held()?;
        while scopes.iter().any(|s| held.contains(s)) {
            held = self
                .released
                .wait(held)
                .map_err(|_| LockError::Poisoned)?;
        }
        held.extend(scopes.iter().copied());
        Ok(ScopeLock {
            table: Arc::clone(self),
            scopes,
        })
    }

    /// Acquire every scope in `scopes` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::AlreadyLocked`] naming the first busy scope.
    pub fn try_acquire(self: &Arc<Self>, scopes: &[Scope]) -> Result<ScopeLock, LockError> {
        let scopes = normalize(scopes);
        let mut held = self.held()?;
        if let Some(busy) = scopes.iter().find(|s| held.contains(s)) {
            return Err(LockError::AlreadyLocked(*busy));
        }
        held.extend(scopes.iter().copied());
        Ok(ScopeLock {
            table: Arc::clone(self),
            scopes,
        })
    }

    /// Check whether a scope is currently held by anyone.
    pub fn is_locked(&self, scope: Scope) -> bool {
        self.held().map(|h| h.contains(&scope)).unwrap_or(false)
    }

    fn release(&self, scopes: &[Scope]) {
        // Best-effort: a poisoned table has nothing left to protect.
        if let Ok(mut held) = self.held.lock() {
            for scope in scopes {
                held.remove(scope);
            }
        }
        self.released.notify_all();
    }
}

fn normalize(scopes: &[Scope]) -> Vec<Scope> {
    let mut scopes = scopes.to_vec();
    scopes.sort_unstable();
    scopes.dedup();
    scopes
}

/// Guard over a set of locked scopes.
///
/// The scopes are released when this guard is dropped.
#[derive(Debug)]
pub struct ScopeLock {
    table: Arc<ScopeLockTable>,
    scopes: Vec<Scope>,
}

impl ScopeLock {
    /// Scopes held by this guard, ascending.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn is_held(&self) -> bool {
        !self.scopes.is_empty()
    }

    /// Release the lock explicitly.
    ///
    /// Calling this more than once is safe.
    pub fn release(&mut self) {
        let scopes = std::mem::take(&mut self.scopes);
        if !scopes.is_empty() {
            self.table.release(&scopes);
        }
    }
}

impl Drop for ScopeLock {
    fn drop(&mut self) {
        self.release();
    }
}
