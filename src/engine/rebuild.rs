//! engine::rebuild
//!
//! Recomputing bounds from the `parent` column.
//!
//! # Algorithm
//!
//! The root's scope is loaded once and its rows grouped by `parent`. A
//! post-order walk from the rebuild root then gives each node the next free
//! left value, numbers its children, and sets its right bound one past the
//! right of its last child:
//!
//! ```text
//! assign(node, left, level):
//!     next = left + 1
//!     for child in children[node] in sibling order:
//!         next = assign(child, next, level + 1) + 1
//!     node := [left, next] at level
//!     return next
//! ```
//!
//! The walk keeps its own stack of open nodes, so a deep chain costs heap,
//! not call stack. Rows with a `parent` outside the scope are not visited.
//!
//! Siblings are ordered by [`SiblingOrder`]: ascending id by default, or
//! by current left bound when the existing order is still trusted.
//!
//! # Atomicity
//!
//! With `rebuild_batch_size == 0` the whole rebuild runs in one
//! transaction. Otherwise rows are written in checkpointed batches, each in
//! its own transaction, and a crash part-way leaves a partly rebuilt tree
//! that a second rebuild repairs.
//!
//! A batched rebuild plans every row up front, before any scope lock is
//! held, and the lock is released between batches. A writer that changes
//! the scope in between makes later batches write stale bounds. Callers
//! must keep other writers off the scope until the rebuild returns, or use
//! a batch size of `0`.
//!
//! Only rows under the rebuild root are renumbered. Rebuilding a subtree
//! whose row count changed leaves the surrounding bounds as they were;
//! rebuild the scope root for that.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use super::{reload_placed, space, NestedSet, TreeError};
use crate::core::config::SiblingOrder;
use crate::core::ops::journal::Journal;
use crate::core::types::{Node, NodeId, Placement, Scope, TypeError};
use crate::store::{NodeRepository, StoreError};

/// Rows to rewrite and where numbering stopped.
#[derive(Debug)]
struct RebuildPlan {
    /// Rows whose placement changes.
    changed: Vec<Node>,
    /// Rows visited in total.
    visited: usize,
    /// First left value after the rebuilt subtree.
    next_left: i64,
}

/// A node whose children are still being numbered.
struct Frame {
    node: Node,
    left: i64,
    level: i64,
    /// Next free bound inside the node.
    next: i64,
    children: std::vec::IntoIter<Node>,
}

/// Depth-first numbering over rows grouped by parent.
///
/// Iterative, so tree depth is bounded by memory rather than the stack.
struct Walk {
    scope: Scope,
    children: BTreeMap<NodeId, Vec<Node>>,
    seen: HashSet<NodeId>,
    changed: Vec<Node>,
}

impl Walk {
    fn new(rows: Vec<Node>, scope: Scope, order: SiblingOrder) -> Self {
        let mut children: BTreeMap<NodeId, Vec<Node>> = BTreeMap::new();
        for row in rows {
            if let Some(parent) = row.parent {
                children.entry(parent).or_default().push(row);
            }
        }
        for siblings in children.values_mut() {
            match order {
                SiblingOrder::Id => siblings.sort_by_key(|n| n.id),
                SiblingOrder::Left => siblings.sort_by_key(|n| (n.left(), n.id)),
            }
        }
        Self {
            scope,
            children,
            seen: HashSet::new(),
            changed: Vec::new(),
        }
    }

    fn enter(&mut self, node: Node, left: i64, level: i64) -> Result<Frame, TreeError> {
        let id = node.id.ok_or_else(|| TreeError::not_loaded(&node))?;
        if !self.seen.insert(id) {
            return Err(TreeError::PersistenceFailure {
                context: "rebuild".into(),
                source: StoreError::Integrity(format!("node {id} is its own ancestor")),
            });
        }
        let children = self.children.remove(&id).unwrap_or_default();
        Ok(Frame {
            node,
            left,
            level,
            next: left + 1,
            children: children.into_iter(),
        })
    }

    fn leave(&mut self, frame: Frame) -> i64 {
        let placement = Placement {
            left: frame.left,
            right: frame.next,
            level: frame.level,
            scope: self.scope,
        };
        if frame.node.placement != Some(placement) {
            let mut node = frame.node;
            node.placement = Some(placement);
            self.changed.push(node);
        }
        placement.right
    }

    /// Number `root` and its subtree; returns the root's right bound.
    fn run(&mut self, root: Node, left: i64, level: i64) -> Result<i64, TreeError> {
        let mut stack = vec![self.enter(root, left, level)?];
        let mut right = left + 1;
        while let Some(top) = stack.last_mut() {
            if let Some(child) = top.children.next() {
                let (left, level) = (top.next, top.level + 1);
                let frame = self.enter(child, left, level)?;
                stack.push(frame);
            } else if let Some(done) = stack.pop() {
                right = self.leave(done);
                if let Some(parent) = stack.last_mut() {
                    parent.next = right + 1;
                }
            }
        }
        Ok(right)
    }
}

fn plan_rebuild<R: NodeRepository>(
    repo: &R,
    root: Node,
    scope: Scope,
    start_left: i64,
    level: i64,
    order: SiblingOrder,
) -> Result<RebuildPlan, TreeError> {
    let rows = repo
        .scope_nodes(scope)
        .map_err(TreeError::store(format!("rebuild: load scope {scope}")))?;
    let mut walk = Walk::new(rows, scope, order);
    let right = walk.run(root, start_left, level)?;
    Ok(RebuildPlan {
        changed: walk.changed,
        visited: walk.seen.len(),
        next_left: right + 1,
    })
}

fn write_rows<R: NodeRepository>(
    repo: &mut R,
    journal: &mut Journal,
    rows: Vec<Node>,
) -> Result<usize, TreeError> {
    let count = rows.len();
    for row in rows {
        space::write_node(repo, journal, row).map_err(TreeError::store("rebuild: write row"))?;
    }
    Ok(count)
}

impl<R: NodeRepository> NestedSet<R> {
    /// Recompute every bound under `root` from the `parent` column.
    ///
    /// `root` is numbered from `start_left`. Returns the first left value
    /// after the rebuilt subtree. Running it twice yields the same bounds.
    pub fn rebuild_subtree(&mut self, root: NodeId, start_left: i64) -> Result<i64, TreeError> {
        if start_left < 1 {
            return Err(TypeError::InvalidBounds(format!(
                "rebuild must start at 1 or later, got {start_left}"
            ))
            .into());
        }

        let (root_node, placement) = self.load_placed(root)?;
        let scope = placement.scope;
        let level = self.rebuild_level(&root_node, &placement)?;
        let order = self.config.sibling_order;
        let batch_size = self.config.rebuild_batch_size;

        if batch_size == 0 {
            let next_left = self.with_transaction("rebuild", &[scope], move |repo, journal| {
                let (root_node, _) = reload_placed(repo, root, scope)?;
                let plan = plan_rebuild(&*repo, root_node, scope, start_left, level, order)?;
                let written = write_rows(repo, journal, plan.changed)?;
                debug!(%root, visited = plan.visited, written, "rebuild planned and written");
                Ok(plan.next_left)
            })?;
            info!(%root, %scope, next_left, "rebuilt subtree");
            return Ok(next_left);
        }

        let plan = plan_rebuild(&self.repo, root_node, scope, start_left, level, order)?;
        let batches: Vec<Vec<Node>> = plan
            .changed
            .chunks(batch_size)
            .map(<[Node]>::to_vec)
            .collect();
        let total = batches.len();
        let verify = self.config.verify_after_write;

        for (index, batch) in batches.into_iter().enumerate() {
            let last = index + 1 == total;
            self.run_transaction("rebuild", &[scope], verify && last, move |repo, journal| {
                let written = write_rows(repo, journal, batch)?;
                journal.checkpoint(format!("batch {}/{total}", index + 1));
                Ok(written)
            })?;
            debug!(%root, batch = index + 1, total, "rebuild checkpoint");
        }

        info!(%root, %scope, visited = plan.visited, batches = total, "rebuilt subtree");
        Ok(plan.next_left)
    }

    /// Level of the rebuild root: one below its parent, or 1 for a root.
    fn rebuild_level(&self, root: &Node, placement: &Placement) -> Result<i64, TreeError> {
        let Some(parent) = root.parent else {
            return Ok(1);
        };
        let parent = self
            .repo
            .load(parent)
            .map_err(TreeError::store(format!("rebuild: load parent {parent}")))?;
        Ok(parent
            .and_then(|p| p.level())
            .map_or(placement.level, |level| level + 1))
    }
}
