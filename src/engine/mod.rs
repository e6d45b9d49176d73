//! engine
//!
//! The nested-set tree engine.
//!
//! # Architecture
//!
//! [`NestedSet`] owns a [`NodeRepository`] and a [`TreeConfig`]. Every
//! mutating operation follows the same lifecycle:
//!
//! ```text
//! resolve (unlocked) -> begin(scopes) -> re-read -> compute bounds
//!     -> open space -> write / shift -> close space -> [verify] -> commit
//! ```
//!
//! Any failure after `begin` runs the journal's compensating steps, then
//! rolls the store transaction back, so a scope is left either exactly as
//! it was or fully updated.
//!
//! # Invariants
//!
//! - Bounds only change through [`space`] primitives
//! - Every mutation holds the scope locks of every scope it touches
//! - A failed operation leaves no opened gap behind
//!
//! # Example
//!
//! ```
//! use nestedset::engine::NestedSet;
//! use nestedset::store::MemoryStore;
//! use nestedset::core::types::Node;
//!
//! let mut tree = NestedSet::with_default_config(MemoryStore::new());
//! let root = tree.make_root(Node::new("A"), None).unwrap();
//! let child = tree
//!     .insert_as_first_child(Node::new("B"), root.id.unwrap())
//!     .unwrap();
//!
//! assert_eq!(child.left(), Some(2));
//! assert_eq!(child.parent, root.id);
//! ```

pub mod error;
pub mod insert;
pub mod query;
pub mod rebuild;
pub mod relocate;
pub mod remove;
pub mod rollback;
pub mod space;
pub mod verify;

pub use error::{MoveRejection, TreeError};
pub use query::{DescendantsQuery, ParentsQuery};
pub use rollback::{rollback_journal, RollbackError, RollbackResult};

use tracing::{debug, info, trace, warn};

use crate::core::config::TreeConfig;
use crate::core::ops::journal::Journal;
use crate::core::types::{Node, NodeId, Placement, Scope};
use crate::store::{NodeRepository, StoreError};

/// A nested-set forest over a row store.
#[derive(Debug)]
pub struct NestedSet<R> {
    repo: R,
    config: TreeConfig,
}

impl<R: NodeRepository> NestedSet<R> {
    /// Create an engine over `repo`.
    pub fn new(repo: R, config: TreeConfig) -> Self {
        Self { repo, config }
    }

    pub fn with_default_config(repo: R) -> Self {
        Self::new(repo, TreeConfig::default())
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Direct access to the store.
    ///
    /// Writing bounds through this handle bypasses every invariant.
    pub fn repo_mut(&mut self) -> &mut R {
        &mut self.repo
    }

    pub fn into_repo(self) -> R {
        self.repo
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Load a node that must be part of a tree.
    pub(crate) fn load_placed(&self, id: NodeId) -> Result<(Node, Placement), TreeError> {
        let node = self
            .repo
            .load(id)
            .map_err(TreeError::store(format!("load node {id}")))?
            .ok_or_else(|| TreeError::missing(id))?;
        match node.placement {
            Some(placement) => Ok((node, placement)),
            None => Err(TreeError::not_loaded(&node)),
        }
    }

    /// Load the target of an insert or move.
    pub(crate) fn load_target(&self, target: NodeId) -> Result<(Node, Placement), TreeError> {
        let node = self
            .repo
            .load(target)
            .map_err(TreeError::store(format!("load target {target}")))?;
        match node {
            Some(node) => match node.placement {
                Some(placement) => Ok((node, placement)),
                None => Err(TreeError::TargetNotFound { target }),
            },
            None => Err(TreeError::TargetNotFound { target }),
        }
    }

    /// Run `f` inside a store transaction holding the locks of `scopes`.
    ///
    /// Commits when `f` succeeds. On any error the journal is compensated
    /// and the transaction rolled back before the error is returned.
    /// With `verify_after_write` set, every scope in `scopes` is verified
    /// before commit.
    pub fn with_transaction<T, F>(
        &mut self,
        operation: &str,
        scopes: &[Scope],
        f: F,
    ) -> Result<T, TreeError>
    where
        F: FnOnce(&mut R, &mut Journal) -> Result<T, TreeError>,
    {
        self.run_transaction(operation, scopes, self.config.verify_after_write, f)
    }

    pub(crate) fn run_transaction<T, F>(
        &mut self,
        operation: &str,
        scopes: &[Scope],
        verify: bool,
        f: F,
    ) -> Result<T, TreeError>
    where
        F: FnOnce(&mut R, &mut Journal) -> Result<T, TreeError>,
    {
        let mut journal = Journal::new(operation);
        debug!(op = %journal.op_id, operation, ?scopes, "begin");

        self.repo
            .begin(scopes)
            .map_err(TreeError::store(format!("{operation}: begin transaction")))?;

        let outcome = f(&mut self.repo, &mut journal).and_then(|value| {
            if verify {
                verify::check_scopes(&self.repo, scopes)?;
            }
            Ok(value)
        });

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                self.abort(&mut journal, &err);
                return Err(err);
            }
        };

        if let Err(source) = self.repo.commit() {
            let err = TreeError::store(format!("{operation}: commit"))(source);
            self.abort(&mut journal, &err);
            return Err(err);
        }

        journal.commit();
        info!(
            op = %journal.op_id,
            operation,
            steps = journal.steps.len(),
            "committed"
        );
        if let Ok(json) = journal.to_json() {
            trace!(journal = %json);
        }
        Ok(value)
    }

    /// Compensate, then roll back the store transaction.
    fn abort(&mut self, journal: &mut Journal, cause: &TreeError) {
        if journal.steps.is_empty() {
            debug!(op = %journal.op_id, operation = %journal.operation, error = %cause, "aborted");
        } else {
            warn!(
                op = %journal.op_id,
                operation = %journal.operation,
                error = %cause,
                steps = journal.steps.len(),
                "rolling back"
            );
        }

        let result = rollback_journal(&mut self.repo, journal);
        if result.complete {
            debug!(op = %journal.op_id, summary = %result.summary());
        } else {
            warn!(op = %journal.op_id, summary = %result.summary(), "compensation incomplete");
        }

        if self.repo.in_transaction() {
            if let Err(err) = self.repo.rollback() {
                warn!(op = %journal.op_id, error = %err, "store rollback failed");
            }
        }
        journal.rollback();
    }
}

/// Re-read a node inside a transaction.
///
/// The scope it was locked under must not have changed since the
/// unlocked read.
pub(crate) fn reload_placed<R: NodeRepository>(
    repo: &R,
    id: NodeId,
    scope: Scope,
) -> Result<(Node, Placement), TreeError> {
    let node = repo
        .load(id)
        .map_err(TreeError::store(format!("reload node {id}")))?
        .ok_or_else(|| TreeError::missing(id))?;
    let placement = node.placement.ok_or_else(|| TreeError::not_loaded(&node))?;
    ensure_scope(id, placement.scope, scope)?;
    Ok((node, placement))
}

/// Re-read a target inside a transaction.
pub(crate) fn reload_target<R: NodeRepository>(
    repo: &R,
    target: NodeId,
    scope: Scope,
) -> Result<(Node, Placement), TreeError> {
    let node = repo
        .load(target)
        .map_err(TreeError::store(format!("reload target {target}")))?
        .ok_or(TreeError::TargetNotFound { target })?;
    let placement = node.placement.ok_or(TreeError::TargetNotFound { target })?;
    ensure_scope(target, placement.scope, scope)?;
    Ok((node, placement))
}

fn ensure_scope(id: NodeId, actual: Scope, locked: Scope) -> Result<(), TreeError> {
    if actual == locked {
        return Ok(());
    }
    Err(TreeError::PersistenceFailure {
        context: format!("node {id}"),
        source: StoreError::Conflict(format!(
            "moved from scope {locked} to {actual} before the lock was taken"
        )),
    })
}

/// Whether any placed row lives in `scope`.
pub(crate) fn scope_occupied<R: NodeRepository>(repo: &R, scope: Scope) -> Result<bool, TreeError> {
    let query = crate::store::NodeQuery::in_scope(scope).limit(Some(1));
    let rows = repo
        .query(&query)
        .map_err(TreeError::store(format!("inspect scope {scope}")))?;
    Ok(!rows.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FailOn, MemoryStore, StoreOp};

    #[test]
    fn transaction_commits_on_success() {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let node = tree
            .with_transaction("custom", &[Scope::FIRST], |repo, journal| {
                space::write_node(repo, journal, Node::new("x"))
                    .map_err(TreeError::store("write"))
            })
            .unwrap();

        assert!(!tree.repo().in_transaction());
        assert_eq!(tree.repo().load(node.id.unwrap()).unwrap(), Some(node));
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let result: Result<(), _> = tree.with_transaction("custom", &[Scope::FIRST], |repo, journal| {
            space::write_node(repo, journal, Node::new("x")).map_err(TreeError::store("write"))?;
            Err(TreeError::ScopeUnavailable { scope: Scope::FIRST })
        });

        assert!(matches!(result, Err(TreeError::ScopeUnavailable { .. })));
        assert_eq!(tree.repo().node_count().unwrap(), 0);
        assert!(!tree.repo().lock_table().is_locked(Scope::FIRST));
    }

    #[test]
    fn commit_failure_rolls_back() {
        let store = MemoryStore::new().fail_on(FailOn::first(StoreOp::Commit));
        let mut tree = NestedSet::with_default_config(store);
        let result = tree.with_transaction("custom", &[Scope::FIRST], |repo, journal| {
            space::write_node(repo, journal, Node::new("x")).map_err(TreeError::store("write"))
        });

        assert!(result.unwrap_err().is_persistence());
        assert_eq!(tree.repo().node_count().unwrap(), 0);
        assert!(!tree.repo().in_transaction());
    }

    #[test]
    fn load_helpers_classify_missing_nodes() {
        let tree = NestedSet::with_default_config(MemoryStore::new());
        assert!(matches!(
            tree.load_placed(NodeId::new(1)),
            Err(TreeError::NotLoaded { .. })
        ));
        assert!(matches!(
            tree.load_target(NodeId::new(1)),
            Err(TreeError::TargetNotFound { .. })
        ));
    }
}
