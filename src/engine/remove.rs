//! engine::remove
//!
//! Subtree deletion.

use tracing::debug;

use super::{reload_placed, space, NestedSet, TreeError};
use crate::core::types::NodeId;
use crate::store::{Interval, NodeRepository};

impl<R: NodeRepository> NestedSet<R> {
    /// Delete `node` and every descendant, then close the gap.
    ///
    /// Deleting a root empties its scope and leaves other scopes alone.
    /// Returns the number of rows removed.
    pub fn delete_subtree(&mut self, node: NodeId) -> Result<usize, TreeError> {
        let (_, placement) = self.load_placed(node)?;
        let scope = placement.scope;

        self.with_transaction("delete", &[scope], move |repo, journal| {
            let (_, p) = reload_placed(repo, node, scope)?;

            let count = space::delete_range(repo, journal, scope, Interval::from(&p))
                .map_err(TreeError::store("delete: remove rows"))?;
            space::close_space(repo, journal, scope, p.left, p.size())
                .map_err(TreeError::store("delete: close space"))?;

            debug!(%node, %scope, count, "deleted subtree");
            Ok(count)
        })
    }
}
