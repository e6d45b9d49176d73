//! init command - Create an empty forest file

use anyhow::{Context as _, Result};

use super::Context;
use crate::store::FileStore;

/// Create the forest file named by `--store`.
pub fn init(ctx: &Context) -> Result<()> {
    let columns = ctx.config.tree_config().columns;
    FileStore::init(&ctx.store, columns)
        .with_context(|| format!("Failed to initialize '{}'", ctx.store.display()))?;

    if !ctx.quiet {
        println!("Initialized empty forest at {}", ctx.store.display());
    }
    Ok(())
}
