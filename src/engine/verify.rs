//! engine::verify
//!
//! Invariant verification against the live store.
//!
//! # Invariants
//!
//! - Verify is read-only; it never mutates the store
//! - Verify is deterministic
//! - A failure right after a committed operation indicates a bug

use tracing::{debug, warn};

use super::{NestedSet, TreeError};
use crate::core::types::{Scope, ScopeFingerprint};
use crate::core::verify::{verify_scope, VerifyResult};
use crate::store::{NodeRepository, StoreError};

impl<R: NodeRepository> NestedSet<R> {
    /// Verify one scope, or every scope when `scope` is `None`.
    pub fn verify(&self, scope: Option<Scope>) -> Result<VerifyResult, TreeError> {
        let scopes = match scope {
            Some(scope) => vec![scope],
            None => self
                .repo
                .scopes()
                .map_err(TreeError::store("verify: list scopes"))?,
        };

        let mut errors = Vec::new();
        for scope in scopes {
            let result = verify_one(&self.repo, scope)?;
            errors.extend(result.errors);
        }

        let result = VerifyResult::from_errors(errors);
        if result.ok {
            debug!(?scope, "verified");
        } else {
            warn!(?scope, violations = result.errors.len(), "verification failed");
        }
        Ok(result)
    }

    /// Fingerprint of one scope's bounds.
    pub fn fingerprint(&self, scope: Scope) -> Result<ScopeFingerprint, TreeError> {
        let nodes = self
            .repo
            .scope_nodes(scope)
            .map_err(TreeError::store(format!("fingerprint scope {scope}")))?;
        Ok(ScopeFingerprint::compute(&nodes))
    }
}

fn verify_one<R: NodeRepository>(repo: &R, scope: Scope) -> Result<VerifyResult, TreeError> {
    let nodes = repo
        .scope_nodes(scope)
        .map_err(TreeError::store(format!("verify scope {scope}")))?;
    Ok(verify_scope(scope, &nodes))
}

/// Fail with `PersistenceFailure` if any of `scopes` is inconsistent.
pub(crate) fn check_scopes<R: NodeRepository>(repo: &R, scopes: &[Scope]) -> Result<(), TreeError> {
    for &scope in scopes {
        let result = verify_one(repo, scope)?;
        if !result.ok {
            let details = result
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TreeError::PersistenceFailure {
                context: format!("verify scope {scope} before commit"),
                source: StoreError::Integrity(details),
            });
        }
    }
    Ok(())
}
