//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! The engine takes a [`TreeConfig`] at construction and never looks at
//! configuration again. Where that value comes from is up to the caller:
//! library users usually build it in code, the `nset` binary loads it from
//! a TOML file.
//!
//! # Locations
//!
//! Searched in order:
//! 1. `$NSET_CONFIG` if set
//! 2. `./nset.toml`
//! 3. `$XDG_CONFIG_HOME/nset/config.toml`
//! 4. `~/.nset/config.toml` (canonical write location)
//!
//! Missing files are not an error; defaults are used.
//!
//! # Example
//!
//! ```no_run
//! use nestedset::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! let tree = config.tree_config();
//! println!("left column: {}", tree.columns.left);
//! println!("store: {}", config.store_path().display());
//! ```

pub mod schema;

pub use schema::{ColumnNames, ConfigFile, RebuildConfig, SiblingOrder};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default store file used when neither the CLI nor config names one.
pub const DEFAULT_STORE: &str = "nset.json";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Engine settings, resolved from defaults and any loaded file.
///
/// Consumed once by [`crate::engine::NestedSet::new`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreeConfig {
    /// Column naming used by stores that persist rows by name.
    pub columns: ColumnNames,
    /// Sibling tiebreak during rebuild.
    pub sibling_order: SiblingOrder,
    /// Rows written per rebuild checkpoint; `0` writes everything in one
    /// transaction.
    pub rebuild_batch_size: usize,
    /// Verify the affected scopes before every commit.
    pub verify_after_write: bool,
}

/// Loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents (defaults when no file was found)
    pub file: ConfigFile,
    /// Path the file was loaded from
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist; otherwise the standard locations are
    /// searched.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed
    /// or validated.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find(),
        };

        let Some(path) = path else {
            return Ok(Config::default());
        };

        let file = Self::read_file(&path)?;
        file.validate()?;
        Ok(Config {
            file,
            path: Some(path),
        })
    }

    /// Find the first existing config file in the standard locations.
    fn find() -> Option<PathBuf> {
        // 1. Check $NSET_CONFIG
        if let Ok(path) = std::env::var("NSET_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check ./nset.toml
        let local = PathBuf::from("nset.toml");
        if local.exists() {
            return Some(local);
        }

        // 3. Check $XDG_CONFIG_HOME/nset/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("nset/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 4. Check ~/.nset/config.toml
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".nset/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Read and parse a config file.
    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for the user config.
    ///
    /// Returns `~/.nset/config.toml`.
    pub fn user_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".nset/config.toml"))
    }

    /// Write a config file atomically.
    ///
    /// Creates parent directories if needed. Writes to a temp file in the
    /// same directory, then renames it over the target.
    pub fn write(path: &Path, file: &ConfigFile) -> Result<(), ConfigError> {
        file.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(file).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut out = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        out.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        out.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    /// Resolve the engine configuration.
    pub fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            columns: self.file.columns.clone().unwrap_or_default(),
            sibling_order: self.sibling_order(),
            rebuild_batch_size: self.rebuild_batch_size(),
            verify_after_write: self.verify_after_write(),
        }
    }

    /// Store file path.
    ///
    /// Defaults to `nset.json` if not configured.
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(self.file.store.as_deref().unwrap_or(DEFAULT_STORE))
    }

    /// Defaults to [`SiblingOrder::Id`] if not configured.
    pub fn sibling_order(&self) -> SiblingOrder {
        self.file
            .rebuild
            .as_ref()
            .and_then(|r| r.sibling_order)
            .unwrap_or_default()
    }

    /// Defaults to `0` (single transaction) if not configured.
    pub fn rebuild_batch_size(&self) -> usize {
        self.file
            .rebuild
            .as_ref()
            .and_then(|r| r.batch_size)
            .unwrap_or(0)
    }

    /// Defaults to `false` if not configured.
    pub fn verify_after_write(&self) -> bool {
        self.file.verify_after_write.unwrap_or(false)
    }

    /// Get the path the config was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
