//! engine::insert
//!
//! Placing detached nodes into a tree.

use tracing::debug;

use super::{reload_target, space, NestedSet, TreeError};
use crate::core::bounds;
use crate::core::types::{Node, NodeId, Position};
use crate::store::NodeRepository;

impl<R: NodeRepository> NestedSet<R> {
    pub fn insert_as_first_child(&mut self, node: Node, target: NodeId) -> Result<Node, TreeError> {
        self.insert(node, Position::FirstChild, target)
    }

    pub fn insert_as_last_child(&mut self, node: Node, target: NodeId) -> Result<Node, TreeError> {
        self.insert(node, Position::LastChild, target)
    }

    pub fn insert_as_prev_sibling(&mut self, node: Node, target: NodeId) -> Result<Node, TreeError> {
        self.insert(node, Position::PrevSibling, target)
    }

    pub fn insert_as_next_sibling(&mut self, node: Node, target: NodeId) -> Result<Node, TreeError> {
        self.insert(node, Position::NextSibling, target)
    }

    /// Insert a detached node at `position` relative to `target`.
    ///
    /// The node may be unsaved or a stored row without bounds. It always
    /// lands as a leaf in the target's scope; the stored row is returned.
    ///
    /// # Errors
    ///
    /// - [`TreeError::AlreadyExists`] if the node already has bounds
    /// - [`TreeError::TargetNotFound`] if `target` is missing or detached
    /// - [`TreeError::InvalidPosition`] for a sibling position next to a root
    /// - [`TreeError::PersistenceFailure`] if the store rejects the write;
    ///   the opened space is closed again first
    pub fn insert(&mut self, node: Node, position: Position, target: NodeId) -> Result<Node, TreeError> {
        self.ensure_detached(&node)?;
        let (_, target_placement) = self.load_target(target)?;
        let scope = target_placement.scope;

        self.with_transaction("insert", &[scope], move |repo, journal| {
            let (target_node, target_placement) = reload_target(repo, target, scope)?;
            let placement = bounds::insertion(Some(&target_placement), position)
                .map_err(|e| TreeError::insert_rejected(target, position, e))?;

            space::open_space(repo, journal, scope, placement.left, placement.size())
                .map_err(TreeError::store("insert: open space"))?;

            let mut node = node;
            node.placement = Some(placement);
            node.parent = if position.is_child() {
                Some(target)
            } else {
                target_node.parent
            };

            let written = space::write_node(repo, journal, node)
                .map_err(TreeError::store("insert: write node"))?;
            debug!(id = ?written.id, %position, %target, "inserted");
            Ok(written)
        })
    }

    /// Reject nodes that already belong to a tree.
    ///
    /// The stored row wins over the in-memory copy.
    fn ensure_detached(&self, node: &Node) -> Result<(), TreeError> {
        if node.is_placed() {
            return Err(TreeError::already_exists(node));
        }
        if let Some(id) = node.id {
            let stored = self
                .repo
                .load(id)
                .map_err(TreeError::store(format!("load node {id}")))?;
            if stored.is_some_and(|n| n.is_placed()) {
                return Err(TreeError::already_exists(node));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Placement, Scope};
    use crate::store::{FailOn, MemoryStore, StoreOp};

    fn tree() -> (NestedSet<MemoryStore>, NodeId) {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let root = tree.make_root(Node::new("A"), None).unwrap();
        (tree, root.id.unwrap())
    }

    fn placement(tree: &NestedSet<MemoryStore>, id: NodeId) -> Placement {
        tree.repo().load(id).unwrap().unwrap().placement.unwrap()
    }

    #[test]
    fn first_and_last_child() {
        let (mut tree, a) = tree();
        let b = tree.insert_as_first_child(Node::new("B"), a).unwrap();
        let c = tree.insert_as_last_child(Node::new("C"), a).unwrap();

        assert_eq!(placement(&tree, a), Placement::new(1, 6, 1, Scope::FIRST).unwrap());
        assert_eq!(b.placement, Some(Placement::new(2, 3, 2, Scope::FIRST).unwrap()));
        assert_eq!(c.placement, Some(Placement::new(4, 5, 2, Scope::FIRST).unwrap()));
        assert_eq!(c.parent, Some(a));
    }

    #[test]
    fn siblings_take_the_target_parent() {
        let (mut tree, a) = tree();
        let b = tree.insert_as_first_child(Node::new("B"), a).unwrap();
        let b_id = b.id.unwrap();

        let before = tree.insert_as_prev_sibling(Node::new("P"), b_id).unwrap();
        let after = tree.insert_as_next_sibling(Node::new("N"), b_id).unwrap();

        assert_eq!(before.left(), Some(2));
        assert_eq!(before.parent, Some(a));
        assert_eq!(placement(&tree, b_id).left, 4);
        assert_eq!(after.left(), Some(6));
        assert_eq!(after.level(), Some(2));
        assert!(tree.verify(None).unwrap().ok);
    }

    #[test]
    fn sibling_of_root_is_invalid() {
        let (mut tree, a) = tree();
        let err = tree.insert_as_next_sibling(Node::new("X"), a).unwrap_err();
        assert!(matches!(err, TreeError::InvalidPosition { .. }));
        assert_eq!(placement(&tree, a), Placement::root(Scope::FIRST));
    }

    #[test]
    fn placed_node_already_exists() {
        let (mut tree, a) = tree();
        let b = tree.insert_as_first_child(Node::new("B"), a).unwrap();
        let err = tree.insert_as_last_child(b.clone(), a).unwrap_err();
        assert!(matches!(err, TreeError::AlreadyExists { .. }));

        // a stale copy without bounds is still rejected
        let mut stale = b;
        stale.placement = None;
        assert!(matches!(
            tree.insert_as_last_child(stale, a),
            Err(TreeError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn missing_target() {
        let (mut tree, _) = tree();
        let err = tree
            .insert_as_first_child(Node::new("X"), NodeId::new(99))
            .unwrap_err();
        assert!(matches!(err, TreeError::TargetNotFound { .. }));
    }

    #[test]
    fn failed_write_releases_space() {
        let (tree, a) = tree();
        let store = tree.into_repo().non_transactional();
        store.set_fail_on(Some(FailOn::first(StoreOp::Insert)));
        let mut tree = NestedSet::with_default_config(store);

        let err = tree.insert_as_first_child(Node::new("B"), a).unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(placement(&tree, a), Placement::root(Scope::FIRST));
    }

    #[test]
    fn validation_failure_is_persistence_failure() {
        let (tree, a) = tree();
        let store = tree
            .into_repo()
            .non_transactional()
            .with_validator(|node| match node.label.as_str() {
                "" => Err("label is required".into()),
                _ => Ok(()),
            });
        let mut tree = NestedSet::with_default_config(store);

        let err = tree.insert_as_last_child(Node::new(""), a).unwrap_err();
        assert!(matches!(
            err,
            TreeError::PersistenceFailure {
                source: crate::store::StoreError::Validation(_),
                ..
            }
        ));
        assert_eq!(placement(&tree, a), Placement::root(Scope::FIRST));
        assert!(tree.verify(None).unwrap().ok);
    }
}
