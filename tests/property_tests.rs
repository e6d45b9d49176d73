//! Property-based tests for tree operations.
//!
//! These tests use proptest to drive random operation sequences through
//! the engine and check that the nested-set invariants survive.

use proptest::prelude::*;

use nestedset::core::types::{Node, NodeId, Position, Scope};
use nestedset::engine::{NestedSet, TreeError};
use nestedset::store::{MemoryStore, NodeRepository};

/// One randomly chosen operation. Node choices are indexes into the
/// current forest, taken modulo its length.
#[derive(Debug, Clone)]
enum Op {
    Root,
    Insert { target: usize, position: Position },
    Move { node: usize, target: usize, position: Position },
    Delete { node: usize },
    Detach { node: usize },
}

fn position() -> impl Strategy<Value = Position> {
    prop::sample::select(Position::ALL.to_vec())
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Root),
        6 => (any::<usize>(), position())
            .prop_map(|(target, position)| Op::Insert { target, position }),
        4 => (any::<usize>(), any::<usize>(), position())
            .prop_map(|(node, target, position)| Op::Move { node, target, position }),
        1 => any::<usize>().prop_map(|node| Op::Delete { node }),
        1 => any::<usize>().prop_map(|node| Op::Detach { node }),
    ]
}

fn pick(tree: &NestedSet<MemoryStore>, index: usize) -> Option<Node> {
    let nodes = tree.forest().unwrap();
    if nodes.is_empty() {
        None
    } else {
        Some(nodes[index % nodes.len()].clone())
    }
}

fn apply(tree: &mut NestedSet<MemoryStore>, op: &Op, counter: &mut usize) -> Result<(), TreeError> {
    *counter += 1;
    let label = format!("n{counter}");
    match *op {
        Op::Root => tree.make_root(Node::new(label), None).map(drop),
        Op::Insert { target, position } => match pick(tree, target) {
            Some(t) => tree.insert(Node::new(label), position, t.id.unwrap()).map(drop),
            None => tree.make_root(Node::new(label), None).map(drop),
        },
        Op::Move {
            node,
            target,
            position,
        } => match (pick(tree, node), pick(tree, target)) {
            (Some(n), Some(t)) => tree.move_to(n.id.unwrap(), position, t.id.unwrap()).map(drop),
            _ => Ok(()),
        },
        Op::Delete { node } => match pick(tree, node) {
            Some(n) => tree.delete_subtree(n.id.unwrap()).map(drop),
            None => Ok(()),
        },
        Op::Detach { node } => match pick(tree, node) {
            Some(n) => tree.make_root(n, None).map(drop),
            None => Ok(()),
        },
    }
}

fn ids(nodes: &[Node]) -> Vec<NodeId> {
    nodes.iter().filter_map(|n| n.id).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any sequence of operations leaves every scope valid.
    #[test]
    fn random_operations_keep_invariants(ops in prop::collection::vec(op(), 1..40)) {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let mut counter = 0;

        for op in &ops {
            if let Err(err) = apply(&mut tree, op, &mut counter) {
                // rejected requests are fine; store failures are not
                prop_assert!(!err.is_persistence(), "{op:?} failed: {err}");
            }
            let result = tree.verify(None).unwrap();
            prop_assert!(result.ok, "after {op:?}: {:?}", result.errors);
        }
    }

    /// Level always equals the length of the root path.
    #[test]
    fn level_equals_path_length(ops in prop::collection::vec(op(), 1..30)) {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let mut counter = 0;
        for op in &ops {
            let _ = apply(&mut tree, op, &mut counter);
        }

        for node in tree.forest().unwrap() {
            let path = tree.path(node.id.unwrap()).unwrap();
            prop_assert_eq!(node.level(), Some(path.len() as i64));
        }
    }

    /// Rebuilding a valid tree changes nothing, and rebuilding twice
    /// gives the same bounds.
    #[test]
    fn rebuild_is_idempotent(ops in prop::collection::vec(op(), 1..30)) {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let mut counter = 0;
        for op in &ops {
            let _ = apply(&mut tree, op, &mut counter);
        }

        for root in tree.roots().unwrap() {
            let scope = root.scope().unwrap();
            tree.rebuild_subtree(root.id.unwrap(), 1).unwrap();
            let first = tree.fingerprint(scope).unwrap();
            tree.rebuild_subtree(root.id.unwrap(), 1).unwrap();
            prop_assert_eq!(tree.fingerprint(scope).unwrap(), first);
        }
        prop_assert!(tree.verify(None).unwrap().ok);
    }

    /// Inserting a leaf and deleting it again restores the scope.
    #[test]
    fn insert_delete_round_trip(
        ops in prop::collection::vec(op(), 1..25),
        target in any::<usize>(),
        position in position(),
    ) {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let mut counter = 0;
        for op in &ops {
            let _ = apply(&mut tree, op, &mut counter);
        }
        let Some(target) = pick(&tree, target) else {
            return Ok(());
        };
        let scope = target.scope().unwrap();
        let before = tree.fingerprint(scope).unwrap();

        match tree.insert(Node::new("extra"), position, target.id.unwrap()) {
            Ok(extra) => {
                tree.delete_subtree(extra.id.unwrap()).unwrap();
                prop_assert_eq!(tree.fingerprint(scope).unwrap(), before);
            }
            Err(err) => prop_assert!(matches!(err, TreeError::InvalidPosition { .. }), "expected InvalidPosition, got {:?}", err),
        }
    }

    /// Operations in one scope never touch another.
    #[test]
    fn other_scopes_untouched(ops in prop::collection::vec(op(), 1..25)) {
        let mut tree = NestedSet::with_default_config(MemoryStore::new());
        let fixed = tree.make_root(Node::new("fixed"), None).unwrap();
        let fixed_id = fixed.id.unwrap();
        tree.insert_as_first_child(Node::new("child"), fixed_id).unwrap();
        let before = tree.fingerprint(Scope::FIRST).unwrap();
        let guarded = ids(&tree.repo().scope_nodes(Scope::FIRST).unwrap());

        tree.make_root(Node::new("play"), None).unwrap();
        let mut counter = 0;
        for op in &ops {
            // only touch nodes outside the guarded scope
            let play_nodes: Vec<Node> = tree
                .forest()
                .unwrap()
                .into_iter()
                .filter(|n| !guarded.contains(&n.id.unwrap()))
                .collect();
            if play_nodes.is_empty() {
                tree.make_root(Node::new("play"), None).unwrap();
                continue;
            }
            counter += 1;
            let pick = |i: usize| play_nodes[i % play_nodes.len()].id.unwrap();
            let _ = match *op {
                Op::Insert { target, position } => {
                    tree.insert(Node::new(format!("p{counter}")), position, pick(target)).map(drop)
                }
                Op::Move { node, target, position } => {
                    tree.move_to(pick(node), position, pick(target)).map(drop)
                }
                Op::Delete { node } => tree.delete_subtree(pick(node)).map(drop),
                Op::Root | Op::Detach { .. } => Ok(()),
            };
        }

        prop_assert_eq!(tree.fingerprint(Scope::FIRST).unwrap(), before);
    }
}
