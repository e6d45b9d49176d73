//! engine::query
//!
//! Read-only traversals.
//!
//! Every traversal is a single range query against the store: ancestors
//! enclose the node, descendants are enclosed by it, and direct relations
//! add a level filter. Nothing here walks the `parent` column.
//!
//! Results are ordered by ascending left bound unless stated otherwise.

use tracing::debug;

use super::{NestedSet, TreeError};
use crate::core::types::{Node, NodeId, Placement, Scope};
use crate::store::{Cmp, LevelFilter, NodeQuery, NodeRepository, Order};

/// Options for [`NestedSet::parents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentsQuery {
    pub include_root: bool,
    pub include_self: bool,
    /// Only the nearest ancestor.
    pub direct_only: bool,
}

impl Default for ParentsQuery {
    fn default() -> Self {
        Self {
            include_root: true,
            include_self: false,
            direct_only: false,
        }
    }
}

/// Options for [`NestedSet::descendants`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescendantsQuery {
    pub include_self: bool,
    /// Only children one level down.
    pub direct_only: bool,
    pub leaves_only: bool,
    pub limit: Option<usize>,
}

impl<R: NodeRepository> NestedSet<R> {
    fn run(&self, query: &NodeQuery, what: &str) -> Result<Vec<Node>, TreeError> {
        let nodes = self
            .repo
            .query(query)
            .map_err(TreeError::store(format!("query {what}")))?;
        debug!(what, ?query, found = nodes.len(), "query");
        Ok(nodes)
    }

    /// Root of `scope`.
    pub fn root(&self, scope: Scope) -> Result<Option<Node>, TreeError> {
        self.repo
            .load_by_position(scope, 1)
            .map_err(TreeError::store(format!("load root of scope {scope}")))
    }

    /// Every root, by ascending scope.
    pub fn roots(&self) -> Result<Vec<Node>, TreeError> {
        self.run(&NodeQuery::all().left(Cmp::eq(1)), "roots")
    }

    /// Every placed node, ordered by `(scope, left)`.
    pub fn forest(&self) -> Result<Vec<Node>, TreeError> {
        self.run(&NodeQuery::all(), "forest")
    }

    /// Ancestors of `node`, outermost first.
    pub fn parents(&self, node: NodeId, options: ParentsQuery) -> Result<Vec<Node>, TreeError> {
        let (_, p) = self.load_placed(node)?;

        let mut query = NodeQuery::in_scope(p.scope)
            .left(Cmp::below(p.left, options.include_self))
            .right(Cmp::above(p.right, options.include_self));
        if options.direct_only {
            // nearest first, so the limit keeps the parent (and the node)
            let limit = if options.include_self { 2 } else { 1 };
            query = query
                .level(LevelFilter::Between(p.level - 1, p.level))
                .order(Order::LeftDesc)
                .limit(Some(limit));
        }

        let mut nodes = self.run(&query, "parents")?;
        nodes.sort_by_key(|n| n.left());
        if !options.include_root {
            nodes.retain(|n| n.left() != Some(1));
        }
        Ok(nodes)
    }

    /// Nearest ancestor of `node`.
    pub fn parent(&self, node: NodeId) -> Result<Option<Node>, TreeError> {
        let options = ParentsQuery {
            direct_only: true,
            ..Default::default()
        };
        Ok(self.parents(node, options)?.pop())
    }

    /// Ancestors plus the node itself, root first.
    pub fn path(&self, node: NodeId) -> Result<Vec<Node>, TreeError> {
        let options = ParentsQuery {
            include_self: true,
            ..Default::default()
        };
        self.parents(node, options)
    }

    pub fn descendants(
        &self,
        node: NodeId,
        options: DescendantsQuery,
    ) -> Result<Vec<Node>, TreeError> {
        let (_, p) = self.load_placed(node)?;

        let mut query = NodeQuery::in_scope(p.scope)
            .left(Cmp::above(p.left, options.include_self))
            .right(Cmp::below(p.right, options.include_self))
            .leaves_only(options.leaves_only)
            .limit(options.limit);
        if options.direct_only {
            let lo = if options.include_self { p.level } else { p.level + 1 };
            query = query.level(LevelFilter::Between(lo, p.level + 1));
        }

        self.run(&query, "descendants")
    }

    /// Direct children of `node`.
    pub fn children(&self, node: NodeId) -> Result<Vec<Node>, TreeError> {
        let options = DescendantsQuery {
            direct_only: true,
            ..Default::default()
        };
        self.descendants(node, options)
    }

    /// Leaves under `node`.
    pub fn leaves(&self, node: NodeId) -> Result<Vec<Node>, TreeError> {
        let options = DescendantsQuery {
            leaves_only: true,
            ..Default::default()
        };
        self.descendants(node, options)
    }

    /// Children of the node's parent. A root has no siblings.
    pub fn siblings(&self, node: NodeId, include_self: bool) -> Result<Vec<Node>, TreeError> {
        let Some(parent) = self.parent(node)? else {
            if include_self {
                let (current, _) = self.load_placed(node)?;
                return Ok(vec![current]);
            }
            return Ok(vec![]);
        };
        let Some(parent_id) = parent.id else {
            return Ok(vec![]);
        };

        let mut nodes = self.children(parent_id)?;
        if !include_self {
            nodes.retain(|n| n.id != Some(node));
        }
        Ok(nodes)
    }
}

/// Bound comparisons between loaded nodes.
///
/// Each predicate is false when either node is detached or the two are in
/// different scopes.
pub mod predicates {
    use super::*;

    fn both(a: &Node, b: &Node) -> Option<(Placement, Placement)> {
        match (a.placement, b.placement) {
            (Some(pa), Some(pb)) if pa.scope == pb.scope => Some((pa, pb)),
            _ => None,
        }
    }

    /// `node` lies strictly inside `ancestor`.
    pub fn is_descendant(node: &Node, ancestor: &Node) -> bool {
        both(node, ancestor).is_some_and(|(n, a)| a.contains(&n))
    }

    /// `node` lies directly under `parent`.
    pub fn is_child(node: &Node, parent: &Node) -> bool {
        both(node, parent).is_some_and(|(n, p)| p.is_parent_of(&n))
    }

    /// `node` is the direct parent of `child`.
    pub fn is_parent(node: &Node, child: &Node) -> bool {
        is_child(child, node)
    }

    /// Distinct nodes at the same level under the same parent.
    ///
    /// Two disjoint intervals at one level do not name their container, so
    /// the shared parent is read from the `parent` column. Every write keeps
    /// that column equal to the nearest containing interval and
    /// [`NestedSet::verify`] reports any row where it is not.
    pub fn is_sibling(a: &Node, b: &Node) -> bool {
        both(a, b).is_some_and(|(pa, pb)| {
            pa.is_disjoint(&pb) && pa.level == pb.level && !pa.is_root() && a.parent == b.parent
        })
    }

    pub fn is_root(node: &Node) -> bool {
        node.placement.is_some_and(|p| p.is_root())
    }

    pub fn is_leaf(node: &Node) -> bool {
        node.placement.is_some_and(|p| p.is_leaf())
    }
}
