//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`NodeId`] - Store-assigned row identifier
//! - [`Scope`] - Identifier of one independent tree in the forest
//! - [`Placement`] - Validated `(left, right, level, scope)` bounds of a node
//! - [`Node`] - A tree member, placed or detached
//! - [`Position`] - Where a node goes relative to a target
//! - [`UtcTimestamp`] - RFC3339 timestamp
//! - [`ScopeFingerprint`] - Hash over a scope's bounds for change detection
//!
//! # Validation
//!
//! These types enforce validity at construction time. A `Placement` with
//! `left >= right` or an odd size cannot be represented, which rules out
//! the most common way of silently corrupting a nested set.
//!
//! # Examples
//!
//! ```
//! use nestedset::core::types::{Placement, Scope};
//!
//! let scope = Scope::new(1).unwrap();
//! let root = Placement::new(1, 6, 1, scope).unwrap();
//! assert_eq!(root.size(), 6);
//! assert_eq!(root.descendant_count(), 2);
//!
//! // Invalid constructions fail at creation time
//! assert!(Placement::new(3, 3, 1, scope).is_err());
//! assert!(Placement::new(1, 4, 0, scope).is_err());
//! assert!(Scope::new(0).is_err());
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),
}

/// Identifier of a stored node.
///
/// Ids are opaque and assigned by the repository on first insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Wrap a raw id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one independent tree.
///
/// Bounds are only comparable between nodes of the same scope. Scopes
/// start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Scope(u64);

impl Scope {
    /// The first scope handed out to an empty store.
    pub const FIRST: Scope = Scope(1);

    /// Create a validated scope.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidScope` for `0`.
    pub fn new(raw: u64) -> Result<Self, TypeError> {
        if raw == 0 {
            return Err(TypeError::InvalidScope("scope must be at least 1".into()));
        }
        Ok(Self(raw))
    }

    /// Get the raw scope value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// The scope after this one.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidScope` when `self` is the largest scope.
    pub fn next(self) -> Result<Self, TypeError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| TypeError::InvalidScope(format!("no scope after {}", self.0)))
    }
}

impl TryFrom<u64> for Scope {
    type Error = TypeError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<Scope> for u64 {
    fn from(scope: Scope) -> Self {
        scope.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The position of a node inside its scope.
///
/// A placement is always well formed on its own (`1 <= left < right`,
/// even size, `level >= 1`). Whether it fits with its neighbours is a
/// property of the whole scope, checked by [`crate::core::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub left: i64,
    pub right: i64,
    pub level: i64,
    pub scope: Scope,
}

impl Placement {
    /// Create a validated placement.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBounds` if the bounds cannot describe a
    /// node of a nested set.
    pub fn new(left: i64, right: i64, level: i64, scope: Scope) -> Result<Self, TypeError> {
        if left < 1 {
            return Err(TypeError::InvalidBounds(format!(
                "left must be at least 1, got {left}"
            )));
        }
        if left >= right {
            return Err(TypeError::InvalidBounds(format!(
                "left ({left}) must be less than right ({right})"
            )));
        }
        if (right - left + 1) % 2 != 0 {
            return Err(TypeError::InvalidBounds(format!(
                "size of [{left}, {right}] is odd"
            )));
        }
        if level < 1 {
            return Err(TypeError::InvalidBounds(format!(
                "level must be at least 1, got {level}"
            )));
        }
        Ok(Self {
            left,
            right,
            level,
            scope,
        })
    }

    /// Placement of a fresh root: `(1, 2, 1)`.
    pub fn root(scope: Scope) -> Self {
        Self {
            left: 1,
            right: 2,
            level: 1,
            scope,
        }
    }

    /// Number of bound values covered by this node and its descendants.
    pub fn size(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Number of descendants below this node.
    pub fn descendant_count(&self) -> i64 {
        (self.size() - 2) / 2
    }

    pub fn is_leaf(&self) -> bool {
        self.size() == 2
    }

    pub fn is_root(&self) -> bool {
        self.left == 1
    }

    /// Whether `other` is a strict descendant of this node.
    ///
    /// Always false across scopes.
    pub fn contains(&self, other: &Placement) -> bool {
        self.scope == other.scope && self.left < other.left && other.right < self.right
    }

    /// Whether the two intervals share no bound (always true across scopes).
    pub fn is_disjoint(&self, other: &Placement) -> bool {
        self.scope != other.scope || self.right < other.left || other.right < self.left
    }

    /// Whether this node is the direct parent of `other`.
    pub fn is_parent_of(&self, other: &Placement) -> bool {
        self.contains(other) && other.level == self.level + 1
    }
}

/// A member of a nested-set forest.
///
/// A node is *detached* while `placement` is `None`: it may or may not
/// have been stored yet, but it is not part of any tree. Only the engine
/// assigns placements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Store-assigned id; `None` until first persisted.
    pub id: Option<NodeId>,
    /// Free-form record payload.
    pub label: String,
    /// Nearest containing node; `None` for roots and detached nodes.
    pub parent: Option<NodeId>,
    /// Bounds inside a scope; `None` for detached nodes.
    pub placement: Option<Placement>,
}

impl Node {
    /// Create a detached, unsaved node.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            parent: None,
            placement: None,
        }
    }

    pub fn is_placed(&self) -> bool {
        self.placement.is_some()
    }

    pub fn scope(&self) -> Option<Scope> {
        self.placement.map(|p| p.scope)
    }

    pub fn left(&self) -> Option<i64> {
        self.placement.map(|p| p.left)
    }

    pub fn right(&self) -> Option<i64> {
        self.placement.map(|p| p.right)
    }

    pub fn level(&self) -> Option<i64> {
        self.placement.map(|p| p.level)
    }
}

/// Where a node is placed relative to a target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    FirstChild,
    LastChild,
    PrevSibling,
    NextSibling,
}

impl Position {
    /// All positions, in a stable order.
    pub const ALL: [Position; 4] = [
        Position::FirstChild,
        Position::LastChild,
        Position::PrevSibling,
        Position::NextSibling,
    ];

    /// Whether the node becomes a child of the target.
    pub fn is_child(self) -> bool {
        matches!(self, Position::FirstChild | Position::LastChild)
    }

    /// Whether the position needs the target to have a parent.
    ///
    /// Sibling positions next to a root would create a second root in the
    /// same scope.
    pub fn requires_parent(self) -> bool {
        !self.is_child()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Position::FirstChild => "first-child",
            Position::LastChild => "last-child",
            Position::PrevSibling => "prev-sibling",
            Position::NextSibling => "next-sibling",
        }
    }
}

impl std::str::FromStr for Position {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Position::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| TypeError::InvalidPosition(s.to_string()))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A UTC timestamp in RFC3339 format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// A stable hash over the bounds of one scope.
///
/// Two scopes with the same fingerprint have the same nodes at the same
/// bounds, levels and parents. Payload columns are not hashed.
///
/// # Example
///
/// ```
/// use nestedset::core::types::{Node, NodeId, Placement, Scope, ScopeFingerprint};
///
/// let mut root = Node::new("root");
/// root.id = Some(NodeId::new(1));
/// root.placement = Some(Placement::root(Scope::FIRST));
///
/// let fp = ScopeFingerprint::compute(&[root.clone()]);
/// assert_eq!(fp, ScopeFingerprint::compute(&[root]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeFingerprint(String);

impl ScopeFingerprint {
    /// Compute a fingerprint over placed nodes.
    ///
    /// Nodes are sorted by `(scope, left)` before hashing so the input order
    /// does not matter. Detached nodes are skipped.
    pub fn compute(nodes: &[Node]) -> Self {
        let mut placed: Vec<(&Node, &Placement)> = nodes
            .iter()
            .filter_map(|n| n.placement.as_ref().map(|p| (n, p)))
            .collect();
        placed.sort_by_key(|(_, p)| (p.scope, p.left));

        let mut hasher = Sha256::new();
        for (node, p) in placed {
            let id = node.id.map(NodeId::get).unwrap_or(0);
            let parent = node.parent.map(NodeId::get).unwrap_or(0);
            hasher.update(
                format!(
                    "{id}\0{}\0{}\0{}\0{}\0{parent}\n",
                    p.scope, p.left, p.right, p.level
                )
                .as_bytes(),
            );
        }

        Self(hex::encode(hasher.finalize()))
    }

    /// Get the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScopeFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
