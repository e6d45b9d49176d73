//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--store <path>`: Forest file (default from config, then `nset.json`)
//! - `--config <path>`: Config file instead of the standard locations
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::types::Position;

/// nset - nested-set forests in a JSON file
#[derive(Parser, Debug)]
#[command(name = "nset")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Forest file to operate on
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Config file to load
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty forest file
    Init,

    /// Create a new tree with LABEL as its root
    #[command(after_help = "\
EXAMPLES:
    # Root in the next free scope
    nset root Electronics

    # Root in a specific scope
    nset root Archive --scope 7")]
    Root {
        label: String,

        /// Scope for the new tree (must be empty)
        #[arg(long)]
        scope: Option<u64>,
    },

    /// Insert a new node relative to a target
    #[command(after_help = "\
EXAMPLES:
    nset insert Phones --target 1 --position last-child
    nset insert Tablets --target 2 --position next-sibling")]
    Insert {
        label: String,

        /// Node the position is relative to
        #[arg(long)]
        target: u64,

        /// first-child, last-child, prev-sibling or next-sibling
        #[arg(long, default_value = "last-child")]
        position: Position,
    },

    /// Move a node and its subtree relative to a target
    #[command(name = "move")]
    Move {
        id: u64,

        /// Node the position is relative to
        #[arg(long)]
        target: u64,

        /// first-child, last-child, prev-sibling or next-sibling
        #[arg(long, default_value = "last-child")]
        position: Position,
    },

    /// Make a node the root of its own tree
    Detach {
        id: u64,

        /// Scope for the new tree (must be empty)
        #[arg(long)]
        scope: Option<u64>,
    },

    /// Delete a node and all its descendants
    Delete { id: u64 },

    /// Recompute bounds under a node from the parent column
    Rebuild {
        id: u64,

        /// Left value given to the node
        #[arg(long, default_value_t = 1)]
        start: i64,
    },

    /// Print placed rows: id scope left right level parent label
    List {
        /// Only this scope
        #[arg(long)]
        scope: Option<u64>,
    },

    /// Check nested-set invariants
    Verify {
        /// Only this scope
        #[arg(long)]
        scope: Option<u64>,
    },

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
}
