//! store::memory
//!
//! In-process row store.
//!
//! # Design
//!
//! Rows live behind an `Arc<Mutex<...>>` so cloned handles share one set
//! of rows and one scope lock table, the way several connections share a
//! database. Each handle carries its own transaction.
//!
//! A transaction remembers the original of every row it touches; rollback
//! puts those originals back. A store built with
//! [`MemoryStore::non_transactional`] skips that step, which is how tests
//! exercise the engine's compensating rollback on its own.
//!
//! Reads are not isolated: a handle sees other handles' uncommitted rows.
//! Writers to the same scope are still serialized by the lock table.
//!
//! # Example
//!
//! ```
//! use nestedset::store::{MemoryStore, NodeRepository};
//! use nestedset::core::types::{Node, Placement, Scope};
//!
//! let mut store = MemoryStore::new();
//! let mut root = Node::new("root");
//! root.placement = Some(Placement::root(Scope::FIRST));
//!
//! store.begin(&[Scope::FIRST]).unwrap();
//! let root = store.insert(root).unwrap();
//! store.commit().unwrap();
//!
//! let handle = store.clone();
//! assert_eq!(handle.load(root.id.unwrap()).unwrap(), Some(root));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BoundColumn, CmpOp, Interval, NodeQuery, NodeRepository, StoreError};
use crate::core::ops::lock::{ScopeLock, ScopeLockTable};
use crate::core::types::{Node, NodeId, Scope};

/// Record-level validation hook, run on every insert and update.
pub type Validator = Arc<dyn Fn(&Node) -> Result<(), String> + Send + Sync>;

/// Store primitive, for failure injection and call recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Insert,
    Update,
    UpdateBounds,
    BulkShift,
    DeleteRange,
    Commit,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Insert => "insert",
            StoreOp::Update => "update",
            StoreOp::UpdateBounds => "update_bounds",
            StoreOp::BulkShift => "bulk_shift",
            StoreOp::DeleteRange => "delete_range",
            StoreOp::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Which call should fail.
///
/// The failure fires once, on call number `skip + 1` of `op`, and is then
/// cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailOn {
    pub op: StoreOp,
    pub skip: usize,
}

impl FailOn {
    /// Fail the first call of `op`.
    pub fn first(op: StoreOp) -> Self {
        Self { op, skip: 0 }
    }

    /// Let `skip` calls of `op` succeed, then fail the next one.
    pub fn after(op: StoreOp, skip: usize) -> Self {
        Self { op, skip }
    }
}

/// Recorded call for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    Begin {
        scopes: Vec<Scope>,
    },
    Insert {
        label: String,
    },
    Update {
        id: NodeId,
    },
    UpdateBounds {
        scope: Scope,
        column: BoundColumn,
        op: CmpOp,
        threshold: i64,
        delta: i64,
    },
    BulkShift {
        scope: Scope,
        interval: Interval,
        offset: i64,
        level_offset: i64,
        new_scope: Scope,
    },
    DeleteRange {
        scope: Scope,
        interval: Interval,
    },
    Commit,
    Rollback,
}

impl StoreOperation {
    fn op(&self) -> Option<StoreOp> {
        match self {
            StoreOperation::Insert { .. } => Some(StoreOp::Insert),
            StoreOperation::Update { .. } => Some(StoreOp::Update),
            StoreOperation::UpdateBounds { .. } => Some(StoreOp::UpdateBounds),
            StoreOperation::BulkShift { .. } => Some(StoreOp::BulkShift),
            StoreOperation::DeleteRange { .. } => Some(StoreOp::DeleteRange),
            StoreOperation::Commit => Some(StoreOp::Commit),
            StoreOperation::Begin { .. } | StoreOperation::Rollback => None,
        }
    }
}

/// Shared mutable state.
struct Inner {
    rows: BTreeMap<NodeId, Node>,
    next_id: u64,
    reserved_scope: Option<Scope>,
    fail_on: Option<FailOn>,
    validator: Option<Validator>,
    operations: Vec<StoreOperation>,
}

impl Inner {
    fn max_scope(&self) -> Option<Scope> {
        let stored = self.rows.values().filter_map(Node::scope).max();
        stored.max(self.reserved_scope)
    }
}

/// Per-handle transaction state.
struct Txn {
    _lock: ScopeLock,
    /// Row state before the first change in this transaction
    /// (`None` if the row did not exist).
    originals: BTreeMap<NodeId, Option<Node>>,
}

impl Txn {
    fn remember(&mut self, id: NodeId, before: Option<Node>) {
        self.originals.entry(id).or_insert(before);
    }
}

/// In-memory [`NodeRepository`].
pub struct MemoryStore {
    shared: Arc<Mutex<Inner>>,
    locks: Arc<ScopeLockTable>,
    txn: Option<Txn>,
    transactional: bool,
}

fn lock(shared: &Mutex<Inner>) -> Result<MutexGuard<'_, Inner>, StoreError> {
    shared.lock().map_err(|_| StoreError::Poisoned)
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Inner {
                rows: BTreeMap::new(),
                next_id: 1,
                reserved_scope: None,
                fail_on: None,
                validator: None,
                operations: Vec::new(),
            })),
            locks: ScopeLockTable::new(),
            txn: None,
            transactional: true,
        }
    }

    /// Create a store holding `nodes` exactly as given.
    ///
    /// Bounds are not checked, so this can seed a damaged tree.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if a node has no id.
    pub fn with_nodes(nodes: Vec<Node>) -> Result<Self, StoreError> {
        let store = Self::new();
        let next_id = nodes
            .iter()
            .filter_map(|n| n.id)
            .map(|id| id.get() + 1)
            .max()
            .unwrap_or(1);
        store.replace(nodes, next_id)?;
        Ok(store)
    }

    /// Make rollback release locks without restoring rows.
    pub fn non_transactional(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Configure a one-shot failure.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.set_fail_on(Some(fail_on));
        self
    }

    /// Configure or clear a one-shot failure on every handle.
    pub fn set_fail_on(&self, fail_on: Option<FailOn>) {
        if let Ok(mut inner) = self.shared.lock() {
            inner.fail_on = fail_on;
        }
    }

    /// Install a record-level validator.
    pub fn with_validator<F>(self, validator: F) -> Self
    where
        F: Fn(&Node) -> Result<(), String> + Send + Sync + 'static,
    {
        if let Ok(mut inner) = self.shared.lock() {
            inner.validator = Some(Arc::new(validator));
        }
        self
    }

    /// Remove the validator.
    pub fn clear_validator(&self) {
        if let Ok(mut inner) = self.shared.lock() {
            inner.validator = None;
        }
    }

    /// The lock table shared by every handle of this store.
    pub fn lock_table(&self) -> Arc<ScopeLockTable> {
        Arc::clone(&self.locks)
    }

    /// Every row, placed or detached, by ascending id.
    pub fn all_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(lock(&self.shared)?.rows.values().cloned().collect())
    }

    pub fn node_count(&self) -> Result<usize, StoreError> {
        Ok(lock(&self.shared)?.rows.len())
    }

    /// Id the next insert will receive.
    pub fn next_id(&self) -> Result<u64, StoreError> {
        Ok(lock(&self.shared)?.next_id)
    }

    /// Recorded calls, oldest first.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.shared
            .lock()
            .map(|inner| inner.operations.clone())
            .unwrap_or_default()
    }

    pub fn clear_operations(&self) {
        if let Ok(mut inner) = self.shared.lock() {
            inner.operations.clear();
        }
    }

    /// Swap in a whole new row set.
    pub(crate) fn replace(&self, nodes: Vec<Node>, next_id: u64) -> Result<(), StoreError> {
        let mut rows = BTreeMap::new();
        for node in nodes {
            let id = node
                .id
                .ok_or_else(|| StoreError::Malformed(format!("row '{}' has no id", node.label)))?;
            rows.insert(id, node);
        }
        let mut inner = lock(&self.shared)?;
        inner.next_id = next_id.max(rows.keys().map(|id| id.get() + 1).max().unwrap_or(1));
        inner.rows = rows;
        Ok(())
    }

    /// Record a call, then fire the configured failure if it matches.
    fn record(&self, operation: StoreOperation) -> Result<(), StoreError> {
        let mut inner = lock(&self.shared)?;
        let op = operation.op();
        inner.operations.push(operation);

        let (Some(op), Some(fail_on)) = (op, inner.fail_on) else {
            return Ok(());
        };
        if fail_on.op != op {
            return Ok(());
        }
        if fail_on.skip > 0 {
            inner.fail_on = Some(FailOn::after(op, fail_on.skip - 1));
            return Ok(());
        }
        inner.fail_on = None;
        Err(StoreError::Injected(op))
    }

    fn validate(inner: &Inner, node: &Node) -> Result<(), StoreError> {
        match &inner.validator {
            Some(validator) => validator(node).map_err(StoreError::Validation),
            None => Ok(()),
        }
    }

    /// Apply `change` to every row of `scope` selected by `select`.
    fn modify_where<S, C>(&mut self, scope: Scope, select: S, change: C) -> Result<usize, StoreError>
    where
        S: Fn(&Node) -> bool,
        C: Fn(&mut Node),
    {
        let mut inner = lock(&self.shared)?;
        let mut count = 0;
        for (id, node) in inner.rows.iter_mut() {
            if node.scope() != Some(scope) || !select(node) {
                continue;
            }
            if let Some(txn) = self.txn.as_mut() {
                txn.remember(*id, Some(node.clone()));
            }
            change(node);
            count += 1;
        }
        Ok(count)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStore {
    /// A new handle on the same rows, without the open transaction.
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            locks: Arc::clone(&self.locks),
            txn: None,
            transactional: self.transactional,
        }
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("rows", &self.node_count().unwrap_or(0))
            .field("in_transaction", &self.txn.is_some())
            .field("transactional", &self.transactional)
            .finish()
    }
}

impl NodeRepository for MemoryStore {
    fn load(&self, id: NodeId) -> Result<Option<Node>, StoreError> {
        Ok(lock(&self.shared)?.rows.get(&id).cloned())
    }

    fn load_by_position(&self, scope: Scope, left: i64) -> Result<Option<Node>, StoreError> {
        let inner = lock(&self.shared)?;
        Ok(inner
            .rows
            .values()
            .find(|n| n.scope() == Some(scope) && n.left() == Some(left))
            .cloned())
    }

    fn query(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError> {
        let inner = lock(&self.shared)?;
        let matched = inner
            .rows
            .values()
            .filter(|n| n.placement.as_ref().is_some_and(|p| query.matches(p)))
            .cloned()
            .collect();
        Ok(query.finish(matched))
    }

    fn scopes(&self) -> Result<Vec<Scope>, StoreError> {
        let inner = lock(&self.shared)?;
        let mut scopes: Vec<Scope> = inner.rows.values().filter_map(Node::scope).collect();
        scopes.sort_unstable();
        scopes.dedup();
        Ok(scopes)
    }

    fn next_scope(&mut self) -> Result<Scope, StoreError> {
        let mut inner = lock(&self.shared)?;
        let next = match inner.max_scope() {
            Some(max) => max.next()?,
            None => Scope::FIRST,
        };
        inner.reserved_scope = Some(next);
        Ok(next)
    }

    fn insert(&mut self, mut node: Node) -> Result<Node, StoreError> {
        self.record(StoreOperation::Insert {
            label: node.label.clone(),
        })?;
        if let Some(id) = node.id {
            return Err(StoreError::DuplicateId(id));
        }

        let mut inner = lock(&self.shared)?;
        Self::validate(&inner, &node)?;

        let id = NodeId::new(inner.next_id);
        inner.next_id += 1;
        node.id = Some(id);
        if let Some(txn) = self.txn.as_mut() {
            txn.remember(id, None);
        }
        inner.rows.insert(id, node.clone());
        Ok(node)
    }

    fn update(&mut self, node: Node) -> Result<Node, StoreError> {
        let id = node
            .id
            .ok_or_else(|| StoreError::Malformed(format!("row '{}' has no id", node.label)))?;
        self.record(StoreOperation::Update { id })?;

        let mut inner = lock(&self.shared)?;
        Self::validate(&inner, &node)?;

        let before = inner.rows.get(&id).cloned().ok_or(StoreError::NotFound(id))?;
        if let Some(txn) = self.txn.as_mut() {
            txn.remember(id, Some(before));
        }
        inner.rows.insert(id, node.clone());
        Ok(node)
    }

    fn update_bounds(
        &mut self,
        scope: Scope,
        column: BoundColumn,
        op: CmpOp,
        threshold: i64,
        delta: i64,
    ) -> Result<usize, StoreError> {
        self.record(StoreOperation::UpdateBounds {
            scope,
            column,
            op,
            threshold,
            delta,
        })?;

        let value = move |node: &Node| match column {
            BoundColumn::Left => node.left(),
            BoundColumn::Right => node.right(),
        };
        self.modify_where(
            scope,
            |node| value(node).is_some_and(|v| op.apply(v, threshold)),
            |node| {
                if let Some(p) = node.placement.as_mut() {
                    match column {
                        BoundColumn::Left => p.left += delta,
                        BoundColumn::Right => p.right += delta,
                    }
                }
            },
        )
    }

    fn bulk_shift(
        &mut self,
        scope: Scope,
        interval: Interval,
        offset: i64,
        level_offset: i64,
        new_scope: Scope,
    ) -> Result<usize, StoreError> {
        self.record(StoreOperation::BulkShift {
            scope,
            interval,
            offset,
            level_offset,
            new_scope,
        })?;

        self.modify_where(
            scope,
            |node| node.placement.as_ref().is_some_and(|p| interval.encloses(p)),
            |node| {
                if let Some(p) = node.placement.as_mut() {
                    p.left += offset;
                    p.right += offset;
                    p.level += level_offset;
                    p.scope = new_scope;
                }
            },
        )
    }

    fn delete_range(&mut self, scope: Scope, interval: Interval) -> Result<usize, StoreError> {
        self.record(StoreOperation::DeleteRange { scope, interval })?;

        let mut inner = lock(&self.shared)?;
        let doomed: Vec<NodeId> = inner
            .rows
            .iter()
            .filter(|(_, n)| {
                n.placement
                    .as_ref()
                    .is_some_and(|p| p.scope == scope && interval.encloses(p))
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &doomed {
            let before = inner.rows.remove(id);
            if let Some(txn) = self.txn.as_mut() {
                txn.remember(*id, before);
            }
        }
        Ok(doomed.len())
    }

    fn begin(&mut self, lock_scopes: &[Scope]) -> Result<(), StoreError> {
        if self.txn.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.record(StoreOperation::Begin {
            scopes: lock_scopes.to_vec(),
        })?;
        let lock = self.locks.acquire(lock_scopes)?;
        self.txn = Some(Txn {
            _lock: lock,
            originals: BTreeMap::new(),
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.txn.is_none() {
            return Err(StoreError::NoTransaction);
        }
        self.record(StoreOperation::Commit)?;
        self.txn = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let txn = self.txn.take().ok_or(StoreError::NoTransaction)?;
        self.record(StoreOperation::Rollback)?;
        if !self.transactional {
            return Ok(());
        }

        let mut inner = lock(&self.shared)?;
        for (id, before) in txn.originals {
            match before {
                Some(node) => {
                    inner.rows.insert(id, node);
                }
                None => {
                    inner.rows.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Placement;
    use crate::store::Cmp;

    fn placed(label: &str, left: i64, right: i64, level: i64) -> Node {
        let mut node = Node::new(label);
        node.placement = Some(Placement::new(left, right, level, Scope::FIRST).unwrap());
        node
    }

    fn seeded() -> (MemoryStore, Vec<Node>) {
        let mut store = MemoryStore::new();
        store.begin(&[Scope::FIRST]).unwrap();
        let nodes = vec![
            store.insert(placed("root", 1, 6, 1)).unwrap(),
            store.insert(placed("a", 2, 3, 2)).unwrap(),
            store.insert(placed("b", 4, 5, 2)).unwrap(),
        ];
        store.commit().unwrap();
        (store, nodes)
    }

    #[test]
    fn insert_assigns_ids() {
        let (store, nodes) = seeded();
        assert_eq!(nodes[0].id, Some(NodeId::new(1)));
        assert_eq!(nodes[2].id, Some(NodeId::new(3)));
        assert_eq!(store.next_id().unwrap(), 4);
    }

    #[test]
    fn insert_with_id_rejected() {
        let (mut store, nodes) = seeded();
        store.begin(&[Scope::FIRST]).unwrap();
        let err = store.insert(nodes[0].clone()).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(_)));
    }

    #[test]
    fn update_unknown_row_fails() {
        let mut store = MemoryStore::new();
        let mut node = Node::new("ghost");
        node.id = Some(NodeId::new(9));
        assert!(matches!(store.update(node), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn load_by_position_and_query() {
        let (store, _) = seeded();
        let root = store.load_by_position(Scope::FIRST, 1).unwrap().unwrap();
        assert_eq!(root.label, "root");

        let query = NodeQuery::in_scope(Scope::FIRST).left(Cmp::gt(1));
        let labels: Vec<_> = store
            .query(&query)
            .unwrap()
            .into_iter()
            .map(|n| n.label)
            .collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn update_bounds_is_one_wide_update() {
        let (mut store, _) = seeded();
        store.clear_operations();
        store.begin(&[Scope::FIRST]).unwrap();
        let changed = store
            .update_bounds(Scope::FIRST, BoundColumn::Right, CmpOp::Ge, 4, 2)
            .unwrap();
        store.commit().unwrap();

        assert_eq!(changed, 2);
        let root = store.load(NodeId::new(1)).unwrap().unwrap();
        assert_eq!(root.right(), Some(8));
        let ops = store.operations();
        assert_eq!(
            ops.iter()
                .filter(|o| matches!(o, StoreOperation::UpdateBounds { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn bulk_shift_moves_scope_and_level() {
        let (mut store, _) = seeded();
        let target = Scope::new(2).unwrap();
        store.begin(&[Scope::FIRST, target]).unwrap();
        let shifted = store
            .bulk_shift(Scope::FIRST, Interval::new(4, 5), -3, -1, target)
            .unwrap();
        store.commit().unwrap();

        assert_eq!(shifted, 1);
        let b = store.load(NodeId::new(3)).unwrap().unwrap();
        assert_eq!(b.placement, Some(Placement::root(target)));
    }

    #[test]
    fn rollback_restores_rows() {
        let (mut store, _) = seeded();
        let before = store.all_nodes().unwrap();

        store.begin(&[Scope::FIRST]).unwrap();
        store.insert(placed("c", 7, 8, 2)).unwrap();
        store
            .update_bounds(Scope::FIRST, BoundColumn::Left, CmpOp::Ge, 2, 10)
            .unwrap();
        store
            .delete_range(Scope::FIRST, Interval::new(1, 100))
            .unwrap();
        store.rollback().unwrap();

        assert_eq!(store.all_nodes().unwrap(), before);
    }

    #[test]
    fn non_transactional_rollback_keeps_rows() {
        let (store, _) = seeded();
        let mut store = store.non_transactional();
        store.begin(&[Scope::FIRST]).unwrap();
        store
            .delete_range(Scope::FIRST, Interval::new(2, 3))
            .unwrap();
        store.rollback().unwrap();

        assert_eq!(store.node_count().unwrap(), 2);
        assert!(!store.in_transaction());
    }

    #[test]
    fn fail_on_fires_once_after_skip() {
        let mut store = MemoryStore::new().fail_on(FailOn::after(StoreOp::Insert, 1));
        store.begin(&[Scope::FIRST]).unwrap();
        assert!(store.insert(Node::new("a")).is_ok());
        let err = store.insert(Node::new("b")).unwrap_err();
        assert!(matches!(err, StoreError::Injected(StoreOp::Insert)));
        assert!(store.insert(Node::new("c")).is_ok());
    }

    #[test]
    fn validator_rejects_rows() {
        let mut store = MemoryStore::new().with_validator(|node| {
            if node.label.is_empty() {
                Err("label is required".into())
            } else {
                Ok(())
            }
        });
        let err = store.insert(Node::new("")).unwrap_err();
        assert!(err.to_string().contains("label is required"));
        assert_eq!(store.node_count().unwrap(), 0);
    }

    #[test]
    fn next_scope_reserves_values() {
        let (mut store, _) = seeded();
        let a = store.next_scope().unwrap();
        let b = store.next_scope().unwrap();
        assert_eq!(a.get(), 2);
        assert_eq!(b.get(), 3);
    }

    #[test]
    fn next_scope_after_last_scope_fails() {
        let mut store = MemoryStore::new();
        let max = Scope::new(u64::MAX).unwrap();
        store
            .replace(vec![Node {
                id: Some(NodeId::new(1)),
                label: "max".into(),
                parent: None,
                placement: Some(Placement::root(max)),
            }], 2)
            .unwrap();

        assert!(matches!(
            store.next_scope(),
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn clones_share_rows_and_locks() {
        let (mut store, _) = seeded();
        let handle = store.clone();
        store.begin(&[Scope::FIRST]).unwrap();
        assert!(handle.lock_table().is_locked(Scope::FIRST));
        store.commit().unwrap();
        assert!(!handle.lock_table().is_locked(Scope::FIRST));
        assert_eq!(handle.node_count().unwrap(), 3);
    }

    #[test]
    fn begin_twice_is_an_error() {
        let mut store = MemoryStore::new();
        store.begin(&[Scope::FIRST]).unwrap();
        assert!(matches!(
            store.begin(&[Scope::FIRST]),
            Err(StoreError::TransactionActive)
        ));
        assert!(matches!(MemoryStore::new().commit(), Err(StoreError::NoTransaction)));
    }

    #[test]
    fn with_nodes_keeps_damaged_rows() {
        let mut node = placed("bad", 1, 2, 1);
        node.id = Some(NodeId::new(5));
        if let Some(p) = node.placement.as_mut() {
            p.right = 7;
        }
        let store = MemoryStore::with_nodes(vec![node]).unwrap();
        assert_eq!(store.next_id().unwrap(), 6);
        assert_eq!(store.load(NodeId::new(5)).unwrap().unwrap().right(), Some(7));
    }
}
