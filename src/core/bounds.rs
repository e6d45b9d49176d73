//! core::bounds
//!
//! Pure bounds arithmetic for inserts and moves.
//!
//! # Rules
//!
//! Given a target node and a [`Position`]:
//!
//! | Position       | new left          | level              |
//! |----------------|-------------------|--------------------|
//! | `FirstChild`   | `target.left + 1` | `target.level + 1` |
//! | `LastChild`    | `target.right`    | `target.level + 1` |
//! | `PrevSibling`  | `target.left`     | `target.level`     |
//! | `NextSibling`  | `target.right + 1`| `target.level`     |
//!
//! A new node is always a leaf (`right = left + 1`). A moved subtree of
//! size `S` keeps its size: every bound inside it shifts by
//! `new_left - old_left` and every level by `level_offset`.
//!
//! # Invariants
//!
//! - Never touches a store; every function is deterministic
//! - Sibling positions next to a root are rejected, so a scope never gets
//!   a second node with `left == 1`

use thiserror::Error;

use super::types::{Placement, Position, Scope};

/// Errors from bounds computation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoundsError {
    /// The target has no placement (not part of any tree).
    #[error("target is not placed in a tree")]
    TargetDetached,

    /// A sibling position was requested next to a root.
    #[error("cannot place a {0} of a root node")]
    RootSibling(Position),

    /// The node and the target are the same node.
    #[error("node cannot be moved relative to itself")]
    SelfTarget,

    /// The target lies inside the subtree being moved.
    #[error("target is a descendant of the moved node")]
    Cycle,
}

/// Left bound the node will occupy right after space is opened.
pub fn destination_left(target: &Placement, position: Position) -> i64 {
    match position {
        Position::FirstChild => target.left + 1,
        Position::LastChild => target.right,
        Position::PrevSibling => target.left,
        Position::NextSibling => target.right + 1,
    }
}

/// Level of a node placed at `position` relative to `target`.
pub fn destination_level(target: &Placement, position: Position) -> i64 {
    if position.is_child() {
        target.level + 1
    } else {
        target.level
    }
}

/// Validate that `target` can anchor `position`.
pub fn check_target(
    target: Option<&Placement>,
    position: Position,
) -> Result<&Placement, BoundsError> {
    let target = target.ok_or(BoundsError::TargetDetached)?;
    if position.requires_parent() && target.is_root() {
        return Err(BoundsError::RootSibling(position));
    }
    Ok(target)
}

/// Placement of a brand new leaf inserted at `position` relative to `target`.
///
/// # Example
///
/// ```
/// use nestedset::core::bounds::insertion;
/// use nestedset::core::types::{Placement, Position, Scope};
///
/// let root = Placement::root(Scope::FIRST);
/// let child = insertion(Some(&root), Position::FirstChild).unwrap();
/// assert_eq!((child.left, child.right, child.level), (2, 3, 2));
/// ```
pub fn insertion(target: Option<&Placement>, position: Position) -> Result<Placement, BoundsError> {
    let target = check_target(target, position)?;
    let left = destination_left(target, position);
    Ok(Placement {
        left,
        right: left + 1,
        level: destination_level(target, position),
        scope: target.scope,
    })
}

/// Everything needed to relocate a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovePlan {
    /// Left bound of the subtree right after space is opened.
    pub new_left: i64,
    /// Size of the moved subtree (`right - left + 1`).
    pub size: i64,
    /// Amount added to every level in the subtree.
    pub level_offset: i64,
    /// Scope the subtree leaves.
    pub from_scope: Scope,
    /// Scope the subtree lands in.
    pub to_scope: Scope,
}

impl MovePlan {
    /// Plan moving `node` to `position` relative to `target`.
    ///
    /// # Errors
    ///
    /// - [`BoundsError::SelfTarget`] if `target` is `node`
    /// - [`BoundsError::Cycle`] if `target` is inside `node`
    /// - [`BoundsError::RootSibling`] for sibling positions next to a root
    pub fn new(node: &Placement, target: &Placement, position: Position) -> Result<Self, BoundsError> {
        if node == target {
            return Err(BoundsError::SelfTarget);
        }
        if node.contains(target) {
            return Err(BoundsError::Cycle);
        }
        let target = check_target(Some(target), position)?;

        Ok(Self {
            new_left: destination_left(target, position),
            size: node.size(),
            level_offset: destination_level(target, position) - node.level,
            from_scope: node.scope,
            to_scope: target.scope,
        })
    }

    pub fn is_cross_scope(&self) -> bool {
        self.from_scope != self.to_scope
    }

    /// Where the subtree sits after space has been opened at `new_left`.
    ///
    /// Opening space in the same scope pushes the subtree right when it
    /// lies at or after the gap.
    pub fn origin_after_space(&self, node: &Placement) -> Placement {
        if !self.is_cross_scope() && node.left >= self.new_left {
            Placement {
                left: node.left + self.size,
                right: node.right + self.size,
                ..*node
            }
        } else {
            *node
        }
    }

    /// Offset applied to every bound of the subtree during the bulk shift.
    pub fn offset(&self, origin: &Placement) -> i64 {
        self.new_left - origin.left
    }

    /// Final placement of the subtree root once the vacated space is closed.
    pub fn final_placement(&self, node: &Placement) -> Placement {
        let origin = self.origin_after_space(node);
        let left = if !self.is_cross_scope() && origin.left < self.new_left {
            self.new_left - self.size
        } else {
            self.new_left
        };
        Placement {
            left,
            right: left + self.size - 1,
            level: node.level + self.level_offset,
            scope: self.to_scope,
        }
    }

    /// Whether the move leaves every bound in the scope unchanged.
    pub fn is_noop(&self, node: &Placement) -> bool {
        self.final_placement(node) == *node
    }
}
