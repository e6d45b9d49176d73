//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Opens the forest file named by the context
//! 2. Calls the engine to execute the command
//! 3. Formats and displays output
//!
//! Handlers do NOT change bounds directly.

mod config_cmd;
mod init;
mod inspect;
mod tree;

pub use config_cmd::show as config_show;
pub use init::init;
pub use inspect::{format_row, list, verify};
pub use tree::{delete, detach, insert, move_node, rebuild, root};

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use super::args::{Command, ConfigCommand};
use crate::core::config::Config;
use crate::core::types::Scope;
use crate::engine::NestedSet;
use crate::store::FileStore;

/// Resolved global settings shared by every handler.
#[derive(Debug)]
pub struct Context {
    /// Forest file
    pub store: PathBuf,
    /// Loaded configuration
    pub config: Config,
    /// Suppress informational output
    pub quiet: bool,
}

impl Context {
    /// Open the forest file and wrap it in an engine.
    pub fn open_tree(&self) -> Result<NestedSet<FileStore>> {
        let tree_config = self.config.tree_config();
        let store = FileStore::open(&self.store, tree_config.columns.clone()).with_context(|| {
            format!(
                "Failed to open forest '{}'. Run 'nset init' first.",
                self.store.display()
            )
        })?;
        Ok(NestedSet::new(store, tree_config))
    }
}

pub(crate) fn parse_scope(raw: Option<u64>) -> Result<Option<Scope>> {
    raw.map(Scope::new)
        .transpose()
        .context("Invalid scope")
}

/// Dispatch a parsed command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Init => init(ctx),
        Command::Root { label, scope } => root(ctx, &label, scope),
        Command::Insert {
            label,
            target,
            position,
        } => insert(ctx, &label, target, position),
        Command::Move {
            id,
            target,
            position,
        } => move_node(ctx, id, target, position),
        Command::Detach { id, scope } => detach(ctx, id, scope),
        Command::Delete { id } => delete(ctx, id),
        Command::Rebuild { id, start } => rebuild(ctx, id, start),
        Command::List { scope } => list(ctx, scope),
        Command::Verify { scope } => verify(ctx, scope),
        Command::Config(ConfigCommand::Show) => config_show(ctx),
    }
}
