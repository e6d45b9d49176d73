//! cli
//!
//! Command-line interface layer for `nset`.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the log subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It opens a [`crate::store::FileStore`], wraps it
//! in a [`crate::engine::NestedSet`] and lets the engine do every bounds
//! change. Handlers only format results.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let store = cli.store.clone().unwrap_or_else(|| config.store_path());

    let ctx = commands::Context {
        store,
        config,
        quiet: cli.quiet,
    };

    commands::dispatch(cli.command, &ctx)
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("NSET_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // A second subscriber (tests calling run twice) is not an error.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
