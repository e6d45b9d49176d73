//! engine::space
//!
//! Journaled bounds primitives.
//!
//! Every structural change is built from these calls. Each one runs a
//! single wide store statement, then records itself in the journal so a
//! failed operation can be compensated.
//!
//! Opening space of `size` at `start` adds `size` to every left and every
//! right bound `>= start`; closing subtracts it. Ancestors of the gap have
//! `left < start <= right`, so only their right bound moves.

use tracing::debug;

use crate::core::ops::journal::{Journal, StepKind};
use crate::core::types::{Node, Scope};
use crate::store::{BoundColumn, CmpOp, Interval, NodeRepository, StoreError};

/// Shift bounds `>= start` by `delta` with one update per column.
pub(crate) fn shift_from<R: NodeRepository>(
    repo: &mut R,
    scope: Scope,
    start: i64,
    delta: i64,
) -> Result<usize, StoreError> {
    let lefts = repo.update_bounds(scope, BoundColumn::Left, CmpOp::Ge, start, delta)?;
    let rights = repo.update_bounds(scope, BoundColumn::Right, CmpOp::Ge, start, delta)?;
    Ok(lefts.max(rights))
}

/// Open a gap of `size` at `start`.
pub fn open_space<R: NodeRepository>(
    repo: &mut R,
    journal: &mut Journal,
    scope: Scope,
    start: i64,
    size: i64,
) -> Result<(), StoreError> {
    let affected = shift_from(repo, scope, start, size)?;
    journal.record(StepKind::SpaceOpened { scope, start, size });
    debug!(%scope, start, size, affected, "opened space");
    Ok(())
}

/// Close a gap of `size` at `start`.
pub fn close_space<R: NodeRepository>(
    repo: &mut R,
    journal: &mut Journal,
    scope: Scope,
    start: i64,
    size: i64,
) -> Result<(), StoreError> {
    let affected = shift_from(repo, scope, start, -size)?;
    journal.record(StepKind::SpaceClosed { scope, start, size });
    debug!(%scope, start, size, affected, "closed space");
    Ok(())
}

/// Relocate the subtree at `interval` in one statement.
pub fn shift_subtree<R: NodeRepository>(
    repo: &mut R,
    journal: &mut Journal,
    scope: Scope,
    interval: Interval,
    offset: i64,
    level_offset: i64,
    new_scope: Scope,
) -> Result<(), StoreError> {
    let moved = repo.bulk_shift(scope, interval, offset, level_offset, new_scope)?;
    journal.record(StepKind::SubtreeShifted {
        scope,
        left: interval.left,
        right: interval.right,
        offset,
        level_offset,
        new_scope,
    });
    debug!(
        %scope,
        %new_scope,
        left = interval.left,
        right = interval.right,
        offset,
        level_offset,
        moved,
        "shifted subtree"
    );
    Ok(())
}

/// Delete the rows at `interval`.
pub fn delete_range<R: NodeRepository>(
    repo: &mut R,
    journal: &mut Journal,
    scope: Scope,
    interval: Interval,
) -> Result<usize, StoreError> {
    let count = repo.delete_range(scope, interval)?;
    journal.record(StepKind::RangeDeleted {
        scope,
        left: interval.left,
        right: interval.right,
        count,
    });
    debug!(%scope, left = interval.left, right = interval.right, count, "deleted range");
    Ok(count)
}

/// Insert or update a row.
///
/// Nodes without an id are inserted; the rest must already be stored.
pub fn write_node<R: NodeRepository>(
    repo: &mut R,
    journal: &mut Journal,
    node: Node,
) -> Result<Node, StoreError> {
    let written = match node.id {
        None => repo.insert(node)?,
        Some(_) => repo.update(node)?,
    };
    journal.record(StepKind::NodeWritten {
        node: written.clone(),
    });
    debug!(id = ?written.id, label = %written.label, "wrote node");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{NodeId, Placement};
    use crate::store::memory::StoreOperation;
    use crate::store::MemoryStore;

    fn placed(label: &str, left: i64, right: i64, level: i64) -> Node {
        let mut node = Node::new(label);
        node.placement = Some(Placement::new(left, right, level, Scope::FIRST).unwrap());
        node
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert(placed("root", 1, 6, 1)).unwrap();
        store.insert(placed("a", 2, 3, 2)).unwrap();
        store.insert(placed("b", 4, 5, 2)).unwrap();
        store.clear_operations();
        store
    }

    fn bounds(store: &MemoryStore, id: u64) -> (i64, i64) {
        let node = store.load(NodeId::new(id)).unwrap().unwrap();
        (node.left().unwrap(), node.right().unwrap())
    }

    #[test]
    fn open_space_grows_ancestors_and_followers() {
        let mut store = store();
        let mut journal = Journal::new("test");
        open_space(&mut store, &mut journal, Scope::FIRST, 4, 2).unwrap();

        assert_eq!(bounds(&store, 1), (1, 8));
        assert_eq!(bounds(&store, 2), (2, 3));
        assert_eq!(bounds(&store, 3), (6, 7));
        assert_eq!(journal.bounds_changes(), 1);
    }

    #[test]
    fn open_space_uses_two_wide_updates() {
        let mut store = store();
        let mut journal = Journal::new("test");
        open_space(&mut store, &mut journal, Scope::FIRST, 2, 2).unwrap();

        let ops = store.operations();
        assert_eq!(ops.len(), 2);
        assert!(ops
            .iter()
            .all(|op| matches!(op, StoreOperation::UpdateBounds { .. })));
    }

    #[test]
    fn close_undoes_open() {
        let mut store = store();
        let before = store.all_nodes().unwrap();
        let mut journal = Journal::new("test");
        open_space(&mut store, &mut journal, Scope::FIRST, 2, 4).unwrap();
        close_space(&mut store, &mut journal, Scope::FIRST, 2, 4).unwrap();
        assert_eq!(store.all_nodes().unwrap(), before);
    }

    #[test]
    fn failed_primitive_is_not_journaled() {
        use crate::store::{FailOn, StoreOp};

        let mut store = store().fail_on(FailOn::after(StoreOp::UpdateBounds, 1));
        let mut journal = Journal::new("test");
        assert!(open_space(&mut store, &mut journal, Scope::FIRST, 2, 2).is_err());
        assert!(journal.steps.is_empty());
    }

    #[test]
    fn delete_and_write_are_journaled() {
        let mut store = store();
        let mut journal = Journal::new("test");
        let count =
            delete_range(&mut store, &mut journal, Scope::FIRST, Interval::new(2, 3)).unwrap();
        assert_eq!(count, 1);

        let written = write_node(&mut store, &mut journal, Node::new("loose")).unwrap();
        assert!(written.id.is_some());
        assert_eq!(journal.steps.len(), 2);
        assert!(!journal.can_fully_rollback());
    }
}
