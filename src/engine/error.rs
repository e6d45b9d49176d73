//! engine::error
//!
//! Errors surfaced by tree operations.

use std::fmt;

use thiserror::Error;

use crate::core::bounds::BoundsError;
use crate::core::types::{Node, NodeId, Position, Scope, TypeError};
use crate::store::StoreError;

/// Why a move was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    /// The target is the node itself.
    SelfTarget,
    /// The target is a descendant of the node.
    Cycle,
    /// A sibling position next to a root.
    RootSibling(Position),
}

impl fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveRejection::SelfTarget => f.write_str("a node cannot be moved relative to itself"),
            MoveRejection::Cycle => f.write_str("the target is a descendant of the node"),
            MoveRejection::RootSibling(position) => {
                write!(f, "a root cannot have a {position}")
            }
        }
    }
}

/// Errors from tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The node is not part of a tree (or does not exist).
    #[error("node {node} is not loaded in a tree")]
    NotLoaded { node: String },

    /// Insert of a node that already belongs to a tree.
    #[error("node {node} already belongs to a tree; move it instead")]
    AlreadyExists { node: String },

    /// The target of an insert or move is missing or detached.
    #[error("target node {target} not found")]
    TargetNotFound { target: NodeId },

    /// A move would corrupt the tree.
    #[error("cannot move node {node} relative to node {target}: {reason}")]
    InvalidMove {
        node: NodeId,
        target: NodeId,
        reason: MoveRejection,
    },

    /// Insert at a position the target cannot accept.
    #[error("cannot insert as {position} of node {target}")]
    InvalidPosition { target: NodeId, position: Position },

    /// The requested scope already has a root.
    #[error("scope {scope} already has a root")]
    ScopeUnavailable { scope: Scope },

    /// A caller-supplied value cannot describe a valid tree.
    #[error(transparent)]
    InvalidInput(#[from] TypeError),

    /// The store failed; the operation was rolled back.
    #[error("{context}: {source}")]
    PersistenceFailure {
        context: String,
        #[source]
        source: StoreError,
    },
}

impl TreeError {
    pub(crate) fn not_loaded(node: &Node) -> Self {
        TreeError::NotLoaded {
            node: describe(node),
        }
    }

    pub(crate) fn missing(id: NodeId) -> Self {
        TreeError::NotLoaded {
            node: id.to_string(),
        }
    }

    pub(crate) fn already_exists(node: &Node) -> Self {
        TreeError::AlreadyExists {
            node: describe(node),
        }
    }

    pub(crate) fn store(context: impl Into<String>) -> impl FnOnce(StoreError) -> Self {
        let context = context.into();
        move |source| TreeError::PersistenceFailure { context, source }
    }

    /// Map a bounds rejection from an insert.
    pub(crate) fn insert_rejected(target: NodeId, position: Position, err: BoundsError) -> Self {
        match err {
            BoundsError::TargetDetached => TreeError::TargetNotFound { target },
            _ => TreeError::InvalidPosition { target, position },
        }
    }

    /// Map a bounds rejection from a move.
    pub(crate) fn move_rejected(node: NodeId, target: NodeId, err: BoundsError) -> Self {
        let reason = match err {
            BoundsError::TargetDetached => return TreeError::TargetNotFound { target },
            BoundsError::SelfTarget => MoveRejection::SelfTarget,
            BoundsError::Cycle => MoveRejection::Cycle,
            BoundsError::RootSibling(position) => MoveRejection::RootSibling(position),
        };
        TreeError::InvalidMove {
            node,
            target,
            reason,
        }
    }

    /// Whether the error came from the store rather than from the request.
    pub fn is_persistence(&self) -> bool {
        matches!(self, TreeError::PersistenceFailure { .. })
    }
}

fn describe(node: &Node) -> String {
    match node.id {
        Some(id) => id.to_string(),
        None => format!("'{}'", node.label),
    }
}
