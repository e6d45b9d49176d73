//! Mutating commands: root, insert, move, detach, delete, rebuild.

use anyhow::{Context as _, Result};

use super::{format_row, parse_scope, Context};
use crate::core::types::{Node, NodeId, Position};
use crate::store::NodeRepository;

fn report(ctx: &Context, node: &Node) {
    if !ctx.quiet {
        println!("{}", format_row(node));
    }
}

/// Create a new tree rooted at a fresh node.
pub fn root(ctx: &Context, label: &str, scope: Option<u64>) -> Result<()> {
    let scope = parse_scope(scope)?;
    let mut tree = ctx.open_tree()?;
    let node = tree
        .make_root(Node::new(label), scope)
        .context("Failed to create root")?;
    report(ctx, &node);
    Ok(())
}

/// Insert a new node relative to `target`.
pub fn insert(ctx: &Context, label: &str, target: u64, position: Position) -> Result<()> {
    let mut tree = ctx.open_tree()?;
    let node = tree
        .insert(Node::new(label), position, NodeId::new(target))
        .with_context(|| format!("Failed to insert '{label}'"))?;
    report(ctx, &node);
    Ok(())
}

/// Move an existing node and its subtree.
pub fn move_node(ctx: &Context, id: u64, target: u64, position: Position) -> Result<()> {
    let mut tree = ctx.open_tree()?;
    let node = tree
        .move_to(NodeId::new(id), position, NodeId::new(target))
        .with_context(|| format!("Failed to move node {id}"))?;
    report(ctx, &node);
    Ok(())
}

/// Turn an existing node into the root of its own tree.
pub fn detach(ctx: &Context, id: u64, scope: Option<u64>) -> Result<()> {
    let scope = parse_scope(scope)?;
    let mut tree = ctx.open_tree()?;
    let node = tree
        .repo()
        .load(NodeId::new(id))?
        .with_context(|| format!("Node {id} not found"))?;
    let node = tree
        .make_root(node, scope)
        .with_context(|| format!("Failed to detach node {id}"))?;
    report(ctx, &node);
    Ok(())
}

/// Delete a node and its descendants.
pub fn delete(ctx: &Context, id: u64) -> Result<()> {
    let mut tree = ctx.open_tree()?;
    let count = tree
        .delete_subtree(NodeId::new(id))
        .with_context(|| format!("Failed to delete node {id}"))?;
    if !ctx.quiet {
        println!("Deleted {count} node(s)");
    }
    Ok(())
}

/// Recompute bounds under a node.
pub fn rebuild(ctx: &Context, id: u64, start: i64) -> Result<()> {
    let mut tree = ctx.open_tree()?;
    let next = tree
        .rebuild_subtree(NodeId::new(id), start)
        .with_context(|| format!("Failed to rebuild node {id}"))?;
    if !ctx.quiet {
        println!("Rebuilt node {id}; next left is {next}");
    }
    Ok(())
}
