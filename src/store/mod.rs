//! store
//!
//! The row-store contract the tree engine depends on.
//!
//! # Architecture
//!
//! The engine never iterates rows itself. Everything it needs from a store
//! is expressed through [`NodeRepository`]:
//!
//! - point lookups (`load`, `load_by_position`)
//! - range-scoped reads (`query`)
//! - wide relative updates of one bound column (`update_bounds`)
//! - a subtree relocation in one statement (`bulk_shift`)
//! - range deletes (`delete_range`)
//! - transactions with per-scope locking (`begin` / `commit` / `rollback`)
//!
//! Implementations:
//!
//! - [`MemoryStore`]: in-process rows, shared between cloned handles
//! - [`FileStore`]: rows persisted to a JSON file under an exclusive file lock
//!
//! # Isolation
//!
//! A store must keep two writers out of the same scope for the whole of a
//! transaction. Both implementations do this by locking every scope named
//! in `begin` until `commit` or `rollback`.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::{FailOn, MemoryStore, StoreOp};

use thiserror::Error;

use crate::core::ops::lock::LockError;
use crate::core::types::{Node, NodeId, Placement, Scope, TypeError};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row with this id.
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// An insert was given a node that already has an id.
    #[error("node {0} already has an id; update it instead")]
    DuplicateId(NodeId),

    /// The record layer rejected the row.
    #[error("record validation failed: {0}")]
    Validation(String),

    /// The stored tree no longer satisfies its invariants.
    #[error("tree integrity violated: {0}")]
    Integrity(String),

    /// State changed between the unlocked read and the transaction.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// `begin` while a transaction is open.
    #[error("a transaction is already active")]
    TransactionActive,

    /// `commit`/`rollback` without an open transaction.
    #[error("no active transaction")]
    NoTransaction,

    /// Failed to acquire scope locks.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Internal state was poisoned by a panicking thread.
    #[error("store state is poisoned")]
    Poisoned,

    /// I/O error reading or writing a store file.
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("store json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value outside its type's range, such as a scope past the last one.
    #[error("invalid value: {0}")]
    InvalidValue(#[from] TypeError),

    /// A stored row could not be decoded.
    #[error("malformed row: {0}")]
    Malformed(String),

    /// A failure configured for testing.
    #[error("injected failure during {0}")]
    Injected(StoreOp),
}

/// Comparison operator for range predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl CmpOp {
    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Gt => lhs > rhs,
        }
    }
}

/// A comparison of one bound against a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cmp {
    pub op: CmpOp,
    pub value: i64,
}

impl Cmp {
    pub fn lt(value: i64) -> Self {
        Self { op: CmpOp::Lt, value }
    }

    pub fn le(value: i64) -> Self {
        Self { op: CmpOp::Le, value }
    }

    pub fn eq(value: i64) -> Self {
        Self { op: CmpOp::Eq, value }
    }

    pub fn ge(value: i64) -> Self {
        Self { op: CmpOp::Ge, value }
    }

    pub fn gt(value: i64) -> Self {
        Self { op: CmpOp::Gt, value }
    }

    /// `<` or `<=` depending on `inclusive`.
    pub fn below(value: i64, inclusive: bool) -> Self {
        if inclusive {
            Self::le(value)
        } else {
            Self::lt(value)
        }
    }

    /// `>` or `>=` depending on `inclusive`.
    pub fn above(value: i64, inclusive: bool) -> Self {
        if inclusive {
            Self::ge(value)
        } else {
            Self::gt(value)
        }
    }

    pub fn matches(&self, value: i64) -> bool {
        self.op.apply(value, self.value)
    }
}

/// Level predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelFilter {
    Eq(i64),
    /// Inclusive range.
    Between(i64, i64),
}

impl LevelFilter {
    pub fn matches(&self, level: i64) -> bool {
        match *self {
            LevelFilter::Eq(l) => level == l,
            LevelFilter::Between(lo, hi) => lo <= level && level <= hi,
        }
    }
}

/// Bound column targeted by [`NodeRepository::update_bounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundColumn {
    Left,
    Right,
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Scope ascending, then left ascending.
    #[default]
    LeftAsc,
    /// Scope ascending, then left descending.
    LeftDesc,
}

/// Inclusive interval of bound values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub left: i64,
    pub right: i64,
}

impl Interval {
    pub fn new(left: i64, right: i64) -> Self {
        Self { left, right }
    }

    /// Whether a node lies entirely inside the interval.
    pub fn encloses(&self, placement: &Placement) -> bool {
        self.left <= placement.left && placement.right <= self.right
    }
}

impl From<&Placement> for Interval {
    fn from(p: &Placement) -> Self {
        Self::new(p.left, p.right)
    }
}

/// A range-scoped read.
///
/// Only placed rows are ever matched.
///
/// # Example
///
/// ```
/// use nestedset::store::{Cmp, LevelFilter, NodeQuery};
/// use nestedset::core::types::Scope;
///
/// // direct children of a node at (1, 10, level 1)
/// let query = NodeQuery::in_scope(Scope::FIRST)
///     .left(Cmp::gt(1))
///     .right(Cmp::lt(10))
///     .level(LevelFilter::Eq(2));
/// assert_eq!(query.limit, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeQuery {
    pub scope: Option<Scope>,
    pub left: Option<Cmp>,
    pub right: Option<Cmp>,
    pub level: Option<LevelFilter>,
    pub leaves_only: bool,
    pub order: Order,
    pub limit: Option<usize>,
}

impl NodeQuery {
    /// Match every placed row of every scope.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match every placed row of one scope.
    pub fn in_scope(scope: Scope) -> Self {
        Self {
            scope: Some(scope),
            ..Self::default()
        }
    }

    pub fn left(mut self, cmp: Cmp) -> Self {
        self.left = Some(cmp);
        self
    }

    pub fn right(mut self, cmp: Cmp) -> Self {
        self.right = Some(cmp);
        self
    }

    pub fn level(mut self, filter: LevelFilter) -> Self {
        self.level = Some(filter);
        self
    }

    pub fn leaves_only(mut self, leaves_only: bool) -> Self {
        self.leaves_only = leaves_only;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Evaluate every predicate except ordering and limit.
    pub fn matches(&self, placement: &Placement) -> bool {
        self.scope.map_or(true, |s| s == placement.scope)
            && self.left.map_or(true, |c| c.matches(placement.left))
            && self.right.map_or(true, |c| c.matches(placement.right))
            && self.level.map_or(true, |f| f.matches(placement.level))
            && (!self.leaves_only || placement.is_leaf())
    }

    /// Sort and truncate rows that already passed [`NodeQuery::matches`].
    pub fn finish(&self, mut nodes: Vec<Node>) -> Vec<Node> {
        nodes.sort_by_key(|n| {
            let p = n.placement.unwrap_or(Placement::root(Scope::FIRST));
            match self.order {
                Order::LeftAsc => (p.scope, p.left),
                Order::LeftDesc => (p.scope, -p.left),
            }
        });
        if let Some(limit) = self.limit {
            nodes.truncate(limit);
        }
        nodes
    }
}

/// The row store behind a nested set.
///
/// Read methods take `&self`; anything that changes rows or transaction
/// state takes `&mut self`. The engine calls every mutating method inside
/// `begin` / `commit`.
pub trait NodeRepository {
    /// Load a row by id, placed or detached.
    fn load(&self, id: NodeId) -> Result<Option<Node>, StoreError>;

    /// Load the placed row at `left` in `scope`.
    fn load_by_position(&self, scope: Scope, left: i64) -> Result<Option<Node>, StoreError>;

    /// Run a range-scoped read.
    fn query(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError>;

    /// Every scope that has at least one placed row, ascending.
    fn scopes(&self) -> Result<Vec<Scope>, StoreError>;

    /// Reserve an unused scope: `max(existing scopes) + 1`.
    ///
    /// Each call returns a different value, even before the scope has rows.
    fn next_scope(&mut self) -> Result<Scope, StoreError>;

    /// Insert a new row, assigning its id.
    fn insert(&mut self, node: Node) -> Result<Node, StoreError>;

    /// Overwrite an existing row.
    fn update(&mut self, node: Node) -> Result<Node, StoreError>;

    /// Add `delta` to `column` of every row in `scope` whose `column`
    /// satisfies `op threshold`. Returns the number of rows changed.
    fn update_bounds(
        &mut self,
        scope: Scope,
        column: BoundColumn,
        op: CmpOp,
        threshold: i64,
        delta: i64,
    ) -> Result<usize, StoreError>;

    /// Shift every row of `scope` enclosed by `interval`: bounds by
    /// `offset`, level by `level_offset`, and scope to `new_scope`.
    fn bulk_shift(
        &mut self,
        scope: Scope,
        interval: Interval,
        offset: i64,
        level_offset: i64,
        new_scope: Scope,
    ) -> Result<usize, StoreError>;

    /// Delete every row of `scope` enclosed by `interval`.
    fn delete_range(&mut self, scope: Scope, interval: Interval) -> Result<usize, StoreError>;

    /// Open a transaction holding the locks of `lock_scopes`.
    fn begin(&mut self, lock_scopes: &[Scope]) -> Result<(), StoreError>;

    /// Make every change since `begin` durable and release the locks.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard every change since `begin` and release the locks.
    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Whether `begin` has been called without a matching commit/rollback.
    fn in_transaction(&self) -> bool;

    /// Every placed row of `scope`, by ascending left.
    fn scope_nodes(&self, scope: Scope) -> Result<Vec<Node>, StoreError> {
        self.query(&NodeQuery::in_scope(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(left: i64, right: i64, level: i64) -> Placement {
        Placement::new(left, right, level, Scope::FIRST).unwrap()
    }

    #[test]
    fn cmp_operators() {
        assert!(Cmp::lt(5).matches(4));
        assert!(!Cmp::lt(5).matches(5));
        assert!(Cmp::le(5).matches(5));
        assert!(Cmp::ge(5).matches(5));
        assert!(!Cmp::gt(5).matches(5));
        assert!(Cmp::eq(5).matches(5));
        assert_eq!(Cmp::below(3, true), Cmp::le(3));
        assert_eq!(Cmp::above(3, false), Cmp::gt(3));
    }

    #[test]
    fn level_filter() {
        assert!(LevelFilter::Eq(2).matches(2));
        assert!(LevelFilter::Between(2, 3).matches(3));
        assert!(!LevelFilter::Between(2, 3).matches(1));
    }

    #[test]
    fn query_matches_all_predicates() {
        let query = NodeQuery::in_scope(Scope::FIRST)
            .left(Cmp::gt(1))
            .right(Cmp::lt(10))
            .level(LevelFilter::Eq(2));

        assert!(query.matches(&p(2, 3, 2)));
        assert!(!query.matches(&p(1, 10, 1)));
        assert!(!query.matches(&p(3, 4, 3)));

        let other = Placement::new(2, 3, 2, Scope::new(2).unwrap()).unwrap();
        assert!(!query.matches(&other));
    }

    #[test]
    fn leaves_only_filters_inner_nodes() {
        let query = NodeQuery::all().leaves_only(true);
        assert!(query.matches(&p(2, 3, 2)));
        assert!(!query.matches(&p(1, 4, 1)));
    }

    #[test]
    fn interval_encloses() {
        let interval = Interval::new(2, 7);
        assert!(interval.encloses(&p(2, 7, 2)));
        assert!(interval.encloses(&p(3, 4, 3)));
        assert!(!interval.encloses(&p(1, 8, 1)));
    }
}
