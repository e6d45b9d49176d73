//! Compensating rollback of journaled bounds changes.
//!
//! Used by every mutating tree operation when a step fails after earlier
//! steps have already shifted bounds.
//!
//! # Rollback Order
//!
//! Steps are undone in reverse journal order. Each reversible step has an
//! exact inverse:
//!
//! | Step             | Inverse                                           |
//! |------------------|---------------------------------------------------|
//! | `SpaceOpened`    | close the same gap                                |
//! | `SpaceClosed`    | reopen the same gap                               |
//! | `SubtreeShifted` | shift the landed subtree back by `-offset`        |
//!
//! # Known Limitations
//!
//! Row writes and range deletes do not store enough to be undone here.
//! They are deferred to the store's own transaction rollback, which runs
//! right after compensation.

use thiserror::Error;
use tracing::{debug, warn};

use super::space;
use crate::core::ops::journal::{Journal, StepKind};
use crate::store::{Interval, NodeRepository, StoreError};

/// Errors from rollback operations.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// The store rejected an inverse primitive.
    #[error("store error while undoing {step}: {source}")]
    Store {
        step: String,
        #[source]
        source: StoreError,
    },
}

/// Result of a rollback attempt.
#[derive(Debug)]
pub struct RollbackResult {
    /// Steps that were undone.
    pub compensated: Vec<String>,
    /// Steps left to the store transaction.
    pub deferred: Vec<String>,
    /// Steps whose inverse failed.
    pub failed: Vec<(String, RollbackError)>,
    /// Whether every inverse that was attempted succeeded.
    pub complete: bool,
}

impl Default for RollbackResult {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackResult {
    pub fn new() -> Self {
        Self {
            compensated: vec![],
            deferred: vec![],
            failed: vec![],
            complete: true,
        }
    }

    pub fn record_success(&mut self, step: String) {
        self.compensated.push(step);
    }

    pub fn record_deferred(&mut self, step: String) {
        self.deferred.push(step);
    }

    pub fn record_failure(&mut self, step: String, error: RollbackError) {
        self.failed.push((step, error));
        self.complete = false;
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        if self.complete {
            format!(
                "Compensated {} steps ({} deferred to the store)",
                self.compensated.len(),
                self.deferred.len()
            )
        } else {
            format!(
                "Partial compensation: {} succeeded, {} failed",
                self.compensated.len(),
                self.failed.len()
            )
        }
    }
}

fn describe(step: &StepKind) -> String {
    match step {
        StepKind::SpaceOpened { scope, start, size } => {
            format!("space opened in scope {scope} at {start} (size {size})")
        }
        StepKind::SpaceClosed { scope, start, size } => {
            format!("space closed in scope {scope} at {start} (size {size})")
        }
        StepKind::SubtreeShifted {
            scope,
            left,
            right,
            new_scope,
            ..
        } => format!("subtree [{left}, {right}] shifted from scope {scope} to {new_scope}"),
        StepKind::NodeWritten { node } => match node.id {
            Some(id) => format!("write of node {id}"),
            None => format!("write of node '{}'", node.label),
        },
        StepKind::RangeDeleted {
            scope, left, right, ..
        } => format!("delete of [{left}, {right}] in scope {scope}"),
        StepKind::Checkpoint { name } => format!("checkpoint {name}"),
    }
}

fn undo<R: NodeRepository>(repo: &mut R, step: &StepKind) -> Result<bool, StoreError> {
    match *step {
        StepKind::SpaceOpened { scope, start, size } => {
            space::shift_from(repo, scope, start, -size)?;
            Ok(true)
        }
        StepKind::SpaceClosed { scope, start, size } => {
            space::shift_from(repo, scope, start, size)?;
            Ok(true)
        }
        StepKind::SubtreeShifted {
            scope,
            left,
            right,
            offset,
            level_offset,
            new_scope,
        } => {
            let landed = Interval::new(left + offset, right + offset);
            repo.bulk_shift(new_scope, landed, -offset, -level_offset, scope)?;
            Ok(true)
        }
        StepKind::NodeWritten { .. } | StepKind::RangeDeleted { .. } => Ok(false),
        StepKind::Checkpoint { .. } => Ok(true),
    }
}

/// Undo the bounds changes recorded in `journal`.
///
/// Every step is attempted even after a failure, so the result lists
/// exactly what could not be undone.
///
/// # Example
///
/// ```ignore
/// let result = rollback_journal(&mut repo, &journal);
/// if !result.complete {
///     for (step, error) in &result.failed {
///         eprintln!("could not undo {step}: {error}");
///     }
/// }
/// ```
pub fn rollback_journal<R: NodeRepository>(repo: &mut R, journal: &Journal) -> RollbackResult {
    let mut result = RollbackResult::new();

    for step in journal.steps_for_rollback() {
        if matches!(step, StepKind::Checkpoint { .. }) {
            continue;
        }
        let name = describe(step);
        match undo(repo, step) {
            Ok(true) => {
                debug!(op = %journal.op_id, step = %name, "compensated");
                result.record_success(name);
            }
            Ok(false) => result.record_deferred(name),
            Err(source) => {
                warn!(op = %journal.op_id, step = %name, error = %source, "compensation failed");
                result.record_failure(
                    name.clone(),
                    RollbackError::Store { step: name, source },
                );
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Node, NodeId, Placement, Scope};
    use crate::store::{FailOn, MemoryStore, StoreOp};

    fn placed(label: &str, left: i64, right: i64, level: i64) -> Node {
        let mut node = Node::new(label);
        node.placement = Some(Placement::new(left, right, level, Scope::FIRST).unwrap());
        node
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new().non_transactional();
        store.insert(placed("root", 1, 8, 1)).unwrap();
        store.insert(placed("a", 2, 5, 2)).unwrap();
        store.insert(placed("a1", 3, 4, 3)).unwrap();
        store.insert(placed("b", 6, 7, 2)).unwrap();
        store
    }

    #[test]
    fn empty_journal_is_complete() {
        let mut store = store();
        let result = rollback_journal(&mut store, &Journal::new("noop"));
        assert!(result.complete);
        assert!(result.compensated.is_empty());
        assert!(result.summary().contains("Compensated 0"));
    }

    #[test]
    fn undoes_a_move_in_reverse_order() {
        let mut store = store();
        let before = store.all_nodes().unwrap();
        let mut journal = Journal::new("move");

        // move a under b as last child
        space::open_space(&mut store, &mut journal, Scope::FIRST, 7, 4).unwrap();
        space::shift_subtree(
            &mut store,
            &mut journal,
            Scope::FIRST,
            Interval::new(2, 5),
            5,
            1,
            Scope::FIRST,
        )
        .unwrap();
        space::close_space(&mut store, &mut journal, Scope::FIRST, 2, 4).unwrap();
        assert_ne!(store.all_nodes().unwrap(), before);

        let result = rollback_journal(&mut store, &journal);
        assert!(result.complete);
        assert_eq!(result.compensated.len(), 3);
        assert_eq!(store.all_nodes().unwrap(), before);
    }

    #[test]
    fn undoes_cross_scope_shift() {
        let mut store = store();
        let before = store.all_nodes().unwrap();
        let other = Scope::new(2).unwrap();
        let mut journal = Journal::new("make_root");

        space::shift_subtree(
            &mut store,
            &mut journal,
            Scope::FIRST,
            Interval::new(2, 5),
            -1,
            -1,
            other,
        )
        .unwrap();
        space::close_space(&mut store, &mut journal, Scope::FIRST, 2, 4).unwrap();

        let result = rollback_journal(&mut store, &journal);
        assert!(result.complete);
        assert_eq!(store.all_nodes().unwrap(), before);
    }

    #[test]
    fn writes_are_deferred() {
        let mut store = store();
        let mut journal = Journal::new("insert");
        space::write_node(&mut store, &mut journal, Node::new("x")).unwrap();

        let result = rollback_journal(&mut store, &journal);
        assert!(result.complete);
        assert_eq!(result.deferred, vec!["write of node 5".to_string()]);
    }

    #[test]
    fn failures_are_collected() {
        let mut store = store();
        let mut journal = Journal::new("insert");
        space::open_space(&mut store, &mut journal, Scope::FIRST, 2, 2).unwrap();
        store.set_fail_on(Some(FailOn::first(StoreOp::UpdateBounds)));

        let result = rollback_journal(&mut store, &journal);
        assert!(!result.complete);
        assert!(result.has_failures());
        assert!(result.summary().contains("Partial"));

        let root = store.load(NodeId::new(1)).unwrap().unwrap();
        assert_eq!(root.right(), Some(10));
    }
}
