//! core::verify
//!
//! Verification of nested-set invariants.
//!
//! # Checks
//!
//! For every scope:
//! - Each node has `left < right` and an even size
//! - Exactly one node has `left == 1`
//! - No two nodes partially overlap
//! - Each node's level is its ancestor count plus one
//! - Each node's `parent` is its nearest containing node
//! - Bounds are numbered `1..=2n` with no gaps or duplicates
//!
//! # Invariants
//!
//! - Never mutates anything
//! - Must be deterministic: violations are reported in `left` order

use std::collections::BTreeMap;

use thiserror::Error;

use super::types::{Node, NodeId, Scope};

/// A single invariant violation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("node {node} has malformed bounds [{left}, {right}]")]
    MalformedBounds { node: String, left: i64, right: i64 },

    #[error("scope {scope} has no root")]
    MissingRoot { scope: Scope },

    #[error("scope {scope} has {count} nodes with left == 1")]
    MultipleRoots { scope: Scope, count: usize },

    #[error("nodes {first} and {second} partially overlap")]
    PartialOverlap { first: String, second: String },

    #[error("node {node} has level {actual}, expected {expected}")]
    LevelMismatch {
        node: String,
        expected: i64,
        actual: i64,
    },

    #[error("node {node} has parent {actual:?}, expected {expected:?}")]
    ParentMismatch {
        node: String,
        expected: Option<NodeId>,
        actual: Option<NodeId>,
    },

    #[error("scope {scope} bounds are not contiguous: expected {expected}, found {found}")]
    Gap {
        scope: Scope,
        expected: i64,
        found: i64,
    },
}

/// Result of verification.
#[derive(Debug)]
pub struct VerifyResult {
    /// Whether verification passed
    pub ok: bool,
    /// Errors found during verification
    pub errors: Vec<VerifyError>,
}

impl VerifyResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            ok: true,
            errors: vec![],
        }
    }

    /// Create a result from collected errors.
    pub fn from_errors(errors: Vec<VerifyError>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
        }
    }
}

fn label(node: &Node) -> String {
    match node.id {
        Some(id) => id.to_string(),
        None => format!("'{}'", node.label),
    }
}

/// Verify one scope.
///
/// Detached nodes and nodes of other scopes are ignored. An empty scope
/// is valid.
pub fn verify_scope(scope: Scope, nodes: &[Node]) -> VerifyResult {
    let mut placed: Vec<&Node> = nodes
        .iter()
        .filter(|n| n.scope() == Some(scope))
        .collect();
    if placed.is_empty() {
        return VerifyResult::success();
    }
    placed.sort_by_key(|n| n.left());

    let mut errors = Vec::new();

    let roots = placed.iter().filter(|n| n.left() == Some(1)).count();
    match roots {
        0 => errors.push(VerifyError::MissingRoot { scope }),
        1 => {}
        count => errors.push(VerifyError::MultipleRoots { scope, count }),
    }

    let mut bounds = Vec::with_capacity(placed.len() * 2);
    // Open ancestors of the current node, outermost first.
    let mut stack: Vec<&Node> = Vec::new();

    for node in &placed {
        let Some(p) = node.placement else { continue };
        bounds.push(p.left);
        bounds.push(p.right);

        if p.left >= p.right || p.size() % 2 != 0 {
            errors.push(VerifyError::MalformedBounds {
                node: label(node),
                left: p.left,
                right: p.right,
            });
            continue;
        }

        while let Some(top) = stack.last() {
            if top.right().is_some_and(|r| r < p.left) {
                stack.pop();
            } else {
                break;
            }
        }

        if let Some(top) = stack.last() {
            if top.right().is_some_and(|r| r < p.right) {
                errors.push(VerifyError::PartialOverlap {
                    first: label(top),
                    second: label(node),
                });
            }
        }

        let expected_level = stack.len() as i64 + 1;
        if p.level != expected_level {
            errors.push(VerifyError::LevelMismatch {
                node: label(node),
                expected: expected_level,
                actual: p.level,
            });
        }

        let expected_parent = stack.last().and_then(|top| top.id);
        if node.parent != expected_parent {
            errors.push(VerifyError::ParentMismatch {
                node: label(node),
                expected: expected_parent,
                actual: node.parent,
            });
        }

        stack.push(node);
    }

    bounds.sort_unstable();
    for (i, found) in bounds.into_iter().enumerate() {
        let expected = i as i64 + 1;
        if found != expected {
            errors.push(VerifyError::Gap {
                scope,
                expected,
                found,
            });
            break;
        }
    }

    VerifyResult::from_errors(errors)
}

/// Verify every scope present in `nodes`.
pub fn verify_forest(nodes: &[Node]) -> VerifyResult {
    let mut by_scope: BTreeMap<Scope, Vec<Node>> = BTreeMap::new();
    for node in nodes {
        if let Some(scope) = node.scope() {
            by_scope.entry(scope).or_default().push(node.clone());
        }
    }

    let errors = by_scope
        .into_iter()
        .flat_map(|(scope, nodes)| verify_scope(scope, &nodes).errors)
        .collect();
    VerifyResult::from_errors(errors)
}
