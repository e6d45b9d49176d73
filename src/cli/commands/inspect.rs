//! Read-only commands: list and verify.

use anyhow::{bail, Context as _, Result};

use super::{parse_scope, Context};
use crate::core::types::Node;

/// One row as `id scope left right level parent label`.
///
/// Missing values print as `-`.
pub fn format_row(node: &Node) -> String {
    fn cell<T: ToString>(value: Option<T>) -> String {
        value.map_or_else(|| "-".to_string(), |v| v.to_string())
    }

    format!(
        "{} {} {} {} {} {} {}",
        cell(node.id),
        cell(node.scope()),
        cell(node.left()),
        cell(node.right()),
        cell(node.level()),
        cell(node.parent),
        node.label
    )
}

/// Print every placed row, ordered by scope then left bound.
pub fn list(ctx: &Context, scope: Option<u64>) -> Result<()> {
    let scope = parse_scope(scope)?;
    let tree = ctx.open_tree()?;
    let nodes = tree.forest().context("Failed to read forest")?;

    for node in nodes
        .iter()
        .filter(|n| scope.is_none() || n.scope() == scope)
    {
        println!("{}", format_row(node));
    }
    Ok(())
}

/// Check invariants and fail when any are violated.
pub fn verify(ctx: &Context, scope: Option<u64>) -> Result<()> {
    let scope = parse_scope(scope)?;
    let tree = ctx.open_tree()?;
    let result = tree.verify(scope).context("Failed to verify forest")?;

    if result.ok {
        if !ctx.quiet {
            println!("ok");
        }
        return Ok(());
    }

    for error in &result.errors {
        println!("{error}");
    }
    bail!("{} invariant violation(s)", result.errors.len())
}
