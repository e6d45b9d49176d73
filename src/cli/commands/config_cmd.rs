//! config command - Show the effective configuration

use anyhow::{Context as _, Result};

use super::Context;
use crate::core::config::{ConfigFile, RebuildConfig};

/// Print the effective configuration as TOML.
///
/// Defaults are filled in so the output is a complete config file.
pub fn show(ctx: &Context) -> Result<()> {
    let tree = ctx.config.tree_config();
    let effective = ConfigFile {
        store: Some(ctx.store.display().to_string()),
        verify_after_write: Some(tree.verify_after_write),
        columns: Some(tree.columns),
        rebuild: Some(RebuildConfig {
            sibling_order: Some(tree.sibling_order),
            batch_size: Some(tree.rebuild_batch_size),
        }),
    };

    let rendered = toml::to_string_pretty(&effective).context("Failed to render config")?;
    if !ctx.quiet {
        match ctx.config.loaded_from() {
            Some(path) => println!("# loaded from {}", path.display()),
            None => println!("# defaults (no config file found)"),
        }
    }
    print!("{rendered}");
    Ok(())
}
