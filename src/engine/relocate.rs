//! engine::relocate
//!
//! Moving subtrees and promoting nodes to roots.
//!
//! # Move Algorithm
//!
//! ```text
//! 1. open `size` at new_left in the target scope
//! 2. the subtree may have been pushed right by step 1: re-derive its interval
//! 3. bulk shift: bounds += new_left - origin.left, level += level_offset,
//!    scope := target scope
//! 4. close `size` at origin.left in the old scope
//! 5. write the new parent
//! ```
//!
//! Steps 1, 3 and 4 are each one store statement, so a move costs five
//! wide updates regardless of subtree size.

use tracing::debug;

use super::{reload_placed, reload_target, scope_occupied, space, NestedSet, TreeError};
use crate::core::bounds::MovePlan;
use crate::core::ops::journal::Journal;
use crate::core::types::{Node, NodeId, Placement, Position, Scope};
use crate::store::{Interval, NodeRepository, StoreError};

impl<R: NodeRepository> NestedSet<R> {
    pub fn move_to_first_child(&mut self, node: NodeId, target: NodeId) -> Result<Node, TreeError> {
        self.move_to(node, Position::FirstChild, target)
    }

    pub fn move_to_last_child(&mut self, node: NodeId, target: NodeId) -> Result<Node, TreeError> {
        self.move_to(node, Position::LastChild, target)
    }

    pub fn move_to_prev_sibling(&mut self, node: NodeId, target: NodeId) -> Result<Node, TreeError> {
        self.move_to(node, Position::PrevSibling, target)
    }

    pub fn move_to_next_sibling(&mut self, node: NodeId, target: NodeId) -> Result<Node, TreeError> {
        self.move_to(node, Position::NextSibling, target)
    }

    /// Move the subtree rooted at `node` to `position` relative to `target`.
    ///
    /// Moving a node to where it already is changes nothing.
    ///
    /// # Errors
    ///
    /// - [`TreeError::NotLoaded`] if `node` has no bounds
    /// - [`TreeError::TargetNotFound`] if `target` is missing or detached
    /// - [`TreeError::InvalidMove`] if `target` is `node`, lies inside it,
    ///   or is a root and `position` is a sibling position
    pub fn move_to(
        &mut self,
        node: NodeId,
        position: Position,
        target: NodeId,
    ) -> Result<Node, TreeError> {
        let (_, from) = self.load_placed(node)?;
        if node == target {
            return Err(TreeError::InvalidMove {
                node,
                target,
                reason: super::MoveRejection::SelfTarget,
            });
        }
        let (_, to) = self.load_target(target)?;
        let (from_scope, to_scope) = (from.scope, to.scope);

        self.with_transaction("move", &[from_scope, to_scope], move |repo, journal| {
            let (current, from) = reload_placed(repo, node, from_scope)?;
            let (target_node, to) = reload_target(repo, target, to_scope)?;

            let plan = MovePlan::new(&from, &to, position)
                .map_err(|e| TreeError::move_rejected(node, target, e))?;
            let parent = if position.is_child() {
                Some(target)
            } else {
                target_node.parent
            };

            if plan.is_noop(&from) {
                debug!(%node, %position, %target, "move is a no-op");
                return set_parent(repo, journal, current, parent);
            }

            relocate(repo, journal, &plan, &from).map_err(TreeError::store("move"))?;

            let (moved, placement) = reload_placed(repo, node, to_scope)?;
            debug!(%node, left = placement.left, right = placement.right, "moved");
            set_parent(repo, journal, moved, parent)
        })
    }

    /// Make `node` the root of a tree.
    ///
    /// - A detached node becomes the root `(1, 2, 1)` of `scope`, or of
    ///   the next unused scope when `scope` is `None`.
    /// - A node that is already a root (of `scope`, if given) is returned
    ///   unchanged.
    /// - Any other placed node has its whole subtree detached into `scope`
    ///   (or the next unused one), closing the gap it leaves behind.
    ///
    /// # Errors
    ///
    /// [`TreeError::ScopeUnavailable`] if `scope` already holds nodes.
    pub fn make_root(&mut self, node: Node, scope: Option<Scope>) -> Result<Node, TreeError> {
        let stored = match node.id {
            Some(id) => self
                .repo
                .load(id)
                .map_err(TreeError::store(format!("load node {id}")))?,
            None => None,
        };

        if let Some((stored, placement)) = stored.and_then(|n| n.placement.map(|p| (n, p))) {
            return self.promote(stored, placement, scope);
        }
        if node.id.is_none() && node.is_placed() {
            return Err(TreeError::already_exists(&node));
        }

        let scope = match scope {
            Some(scope) => scope,
            None => self
                .repo
                .next_scope()
                .map_err(TreeError::store("make_root: allocate scope"))?,
        };

        self.with_transaction("make_root", &[scope], move |repo, journal| {
            if scope_occupied(repo, scope)? {
                return Err(TreeError::ScopeUnavailable { scope });
            }
            let mut node = node;
            node.placement = Some(Placement::root(scope));
            node.parent = None;
            let root = space::write_node(repo, journal, node)
                .map_err(TreeError::store("make_root: write node"))?;
            debug!(id = ?root.id, %scope, "created root");
            Ok(root)
        })
    }

    /// Detach a placed subtree into its own scope.
    fn promote(
        &mut self,
        stored: Node,
        placement: Placement,
        scope: Option<Scope>,
    ) -> Result<Node, TreeError> {
        let from_scope = placement.scope;
        if placement.is_root() && scope.map_or(true, |s| s == from_scope) {
            debug!(id = ?stored.id, %from_scope, "already a root");
            return Ok(stored);
        }
        if scope == Some(from_scope) {
            return Err(TreeError::ScopeUnavailable { scope: from_scope });
        }
        let id = stored.id.ok_or_else(|| TreeError::not_loaded(&stored))?;

        let to_scope = match scope {
            Some(scope) => scope,
            None => self
                .repo
                .next_scope()
                .map_err(TreeError::store("make_root: allocate scope"))?,
        };

        self.with_transaction("make_root", &[from_scope, to_scope], move |repo, journal| {
            let (_, from) = reload_placed(repo, id, from_scope)?;
            if scope_occupied(repo, to_scope)? {
                return Err(TreeError::ScopeUnavailable { scope: to_scope });
            }

            detach(repo, journal, &from, to_scope).map_err(TreeError::store("make_root"))?;

            let (root, _) = reload_placed(repo, id, to_scope)?;
            debug!(%id, %from_scope, %to_scope, "promoted subtree to root");
            set_parent(repo, journal, root, None)
        })
    }
}

/// Apply a move plan.
fn relocate<R: NodeRepository>(
    repo: &mut R,
    journal: &mut Journal,
    plan: &MovePlan,
    from: &Placement,
) -> Result<(), StoreError> {
    space::open_space(repo, journal, plan.to_scope, plan.new_left, plan.size)?;

    let origin = plan.origin_after_space(from);
    space::shift_subtree(
        repo,
        journal,
        origin.scope,
        Interval::from(&origin),
        plan.offset(&origin),
        plan.level_offset,
        plan.to_scope,
    )?;

    space::close_space(repo, journal, origin.scope, origin.left, plan.size)
}

/// Move a subtree to `(1, size)` of an empty scope.
fn detach<R: NodeRepository>(
    repo: &mut R,
    journal: &mut Journal,
    from: &Placement,
    to_scope: Scope,
) -> Result<(), StoreError> {
    space::shift_subtree(
        repo,
        journal,
        from.scope,
        Interval::from(from),
        1 - from.left,
        1 - from.level,
        to_scope,
    )?;
    space::close_space(repo, journal, from.scope, from.left, from.size())
}

/// Write `parent` if it differs from the stored value.
fn set_parent<R: NodeRepository>(
    repo: &mut R,
    journal: &mut Journal,
    mut node: Node,
    parent: Option<NodeId>,
) -> Result<Node, TreeError> {
    if node.parent == parent {
        return Ok(node);
    }
    node.parent = parent;
    space::write_node(repo, journal, node).map_err(TreeError::store("write parent"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MoveRejection;
    use crate::store::{FailOn, MemoryStore, StoreOp};

    struct Fixture {
        tree: NestedSet<MemoryStore>,
        a: NodeId,
        b: NodeId,
        c: NodeId,
    }

    /// A(1,6) with children B(2,3) and C(4,5).
    fn fixture() -> Fixture {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let a = tree.make_root(Node::new("A"), None).unwrap().id.unwrap();
        let b = tree
            .insert_as_last_child(Node::new("B"), a)
            .unwrap()
            .id
            .unwrap();
        let c = tree
            .insert_as_last_child(Node::new("C"), a)
            .unwrap()
            .id
            .unwrap();
        Fixture { tree, a, b, c }
    }

    fn bounds(tree: &NestedSet<MemoryStore>, id: NodeId) -> (i64, i64, i64) {
        let p = tree.repo().load(id).unwrap().unwrap().placement.unwrap();
        (p.left, p.right, p.level)
    }

    #[test]
    fn next_sibling_swaps_order() {
        let Fixture { mut tree, a, b, c } = fixture();
        let moved = tree.move_to_next_sibling(b, c).unwrap();

        assert_eq!(moved.left(), Some(4));
        assert_eq!(bounds(&tree, b), (4, 5, 2));
        assert_eq!(bounds(&tree, c), (2, 3, 2));
        assert_eq!(bounds(&tree, a), (1, 6, 1));
        assert!(tree.verify(None).unwrap().ok);
    }

    #[test]
    fn into_sibling_changes_parent_and_level() {
        let Fixture { mut tree, a, b, c } = fixture();
        let moved = tree.move_to_first_child(c, b).unwrap();

        assert_eq!(moved.parent, Some(b));
        assert_eq!(bounds(&tree, b), (2, 5, 2));
        assert_eq!(bounds(&tree, c), (3, 4, 3));
        assert_eq!(bounds(&tree, a), (1, 6, 1));
        assert!(tree.verify(None).unwrap().ok);
    }

    #[test]
    fn to_current_position_is_noop() {
        let Fixture { mut tree, a, b, .. } = fixture();
        let before = tree.fingerprint(Scope::FIRST).unwrap();
        tree.repo().clear_operations();

        tree.move_to_first_child(b, a).unwrap();

        assert_eq!(tree.fingerprint(Scope::FIRST).unwrap(), before);
        assert!(!tree
            .repo()
            .operations()
            .iter()
            .any(|op| matches!(op, crate::store::memory::StoreOperation::UpdateBounds { .. })));
    }

    #[test]
    fn rejects_self_and_cycles() {
        let Fixture { mut tree, a, b, .. } = fixture();
        assert!(matches!(
            tree.move_to_first_child(b, b),
            Err(TreeError::InvalidMove {
                reason: MoveRejection::SelfTarget,
                ..
            })
        ));
        assert!(matches!(
            tree.move_to_first_child(a, b),
            Err(TreeError::InvalidMove {
                reason: MoveRejection::Cycle,
                ..
            })
        ));
    }

    #[test]
    fn rejects_sibling_of_root() {
        let Fixture { mut tree, a, b, .. } = fixture();
        let other = tree.make_root(Node::new("R"), None).unwrap().id.unwrap();
        let err = tree.move_to_prev_sibling(b, other).unwrap_err();
        assert!(matches!(
            err,
            TreeError::InvalidMove {
                reason: MoveRejection::RootSibling(Position::PrevSibling),
                ..
            }
        ));
        assert_eq!(bounds(&tree, a), (1, 6, 1));
    }

    #[test]
    fn detached_node_is_not_loaded() {
        let Fixture { mut tree, a, .. } = fixture();
        let loose = {
            let repo = tree.repo_mut();
            repo.insert(Node::new("loose")).unwrap().id.unwrap()
        };
        assert!(matches!(
            tree.move_to_first_child(loose, a),
            Err(TreeError::NotLoaded { .. })
        ));
    }

    #[test]
    fn across_scopes() {
        let Fixture { mut tree, a, b, .. } = fixture();
        let r = tree.make_root(Node::new("R"), None).unwrap();
        let r_id = r.id.unwrap();
        let scope_two = r.scope().unwrap();

        let moved = tree.move_to_last_child(b, r_id).unwrap();
        assert_eq!(moved.scope(), Some(scope_two));
        assert_eq!(moved.parent, Some(r_id));
        assert_eq!(bounds(&tree, r_id), (1, 4, 1));
        assert_eq!(bounds(&tree, b), (2, 3, 2));
        assert_eq!(bounds(&tree, a), (1, 4, 1));
        assert!(tree.verify(None).unwrap().ok);
    }

    #[test]
    fn failed_move_is_compensated() {
        let Fixture { tree, a, b, c } = fixture();
        let store = tree.into_repo().non_transactional();
        // open space (2 updates) succeeds, the first close update fails
        store.set_fail_on(Some(FailOn::after(StoreOp::UpdateBounds, 2)));
        let mut tree = NestedSet::with_default_config(store);
        let before = tree.fingerprint(Scope::FIRST).unwrap();

        let err = tree.move_to_next_sibling(b, c).unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(tree.fingerprint(Scope::FIRST).unwrap(), before);
        assert_eq!(bounds(&tree, a), (1, 6, 1));
    }

    #[test]
    fn make_root_on_root_is_unchanged() {
        let Fixture { mut tree, a, .. } = fixture();
        let root = tree.repo().load(a).unwrap().unwrap();
        let again = tree.make_root(root.clone(), None).unwrap();
        assert_eq!(again, root);
    }

    #[test]
    fn make_root_in_taken_scope() {
        let Fixture { mut tree, .. } = fixture();
        let err = tree
            .make_root(Node::new("X"), Some(Scope::FIRST))
            .unwrap_err();
        assert!(matches!(err, TreeError::ScopeUnavailable { .. }));
    }

    #[test]
    fn make_root_allocates_next_scope() {
        let Fixture { mut tree, .. } = fixture();
        let r = tree.make_root(Node::new("R"), None).unwrap();
        assert_eq!(r.scope(), Scope::new(2).ok());
        assert_eq!(r.placement, Some(Placement::root(Scope::new(2).unwrap())));
    }

    #[test]
    fn make_root_detaches_subtree() {
        let Fixture { mut tree, a, b, c } = fixture();
        tree.move_to_first_child(c, b).unwrap();

        let b_node = tree.repo().load(b).unwrap().unwrap();
        let promoted = tree.make_root(b_node, None).unwrap();

        let new_scope = Scope::new(2).unwrap();
        assert_eq!(promoted.placement, Some(Placement::new(1, 4, 1, new_scope).unwrap()));
        assert_eq!(promoted.parent, None);
        assert_eq!(bounds(&tree, c), (2, 3, 2));
        assert_eq!(bounds(&tree, a), (1, 2, 1));
        assert!(tree.verify(None).unwrap().ok);
    }

    #[test]
    fn make_root_after_last_scope_fails_cleanly() {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let max = Scope::new(u64::MAX).unwrap();
        tree.make_root(Node::new("max"), Some(max)).unwrap();

        let err = tree.make_root(Node::new("next"), None).unwrap_err();

        assert!(matches!(
            err,
            TreeError::PersistenceFailure {
                source: StoreError::InvalidValue(_),
                ..
            }
        ));
        assert_eq!(tree.repo().node_count().unwrap(), 1);
        assert!(tree.verify(None).unwrap().ok);
    }
}
