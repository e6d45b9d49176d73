//! core::config::schema
//!
//! Configuration schema types.
//!
//! Located at (in order of precedence):
//! 1. `$NSET_CONFIG` if set
//! 2. `./nset.toml`
//! 3. `$XDG_CONFIG_HOME/nset/config.toml`
//! 4. `~/.nset/config.toml` (canonical write location)
//!
//! # Validation
//!
//! Config values are validated after parsing: column names must be
//! non-empty, distinct, and must not shadow the reserved `id` and
//! `label` fields of a stored row.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Field names every stored row carries regardless of column mapping.
pub const RESERVED_FIELDS: [&str; 2] = ["id", "label"];

/// Configuration file contents.
///
/// # Example
///
/// ```toml
/// store = "forest.json"
/// verify_after_write = true
///
/// [columns]
/// left = "lft"
/// right = "rgt"
/// level = "lvl"
/// scope = "scope"
/// parent = "parent_id"
///
/// [rebuild]
/// sibling_order = "id"
/// batch_size = 500
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Default store path used by the CLI
    pub store: Option<String>,

    /// Run invariant verification before every commit
    pub verify_after_write: Option<bool>,

    /// Column naming for stored rows
    pub columns: Option<ColumnNames>,

    /// Rebuild behaviour
    pub rebuild: Option<RebuildConfig>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(store) = &self.store {
            if store.trim().is_empty() {
                return Err(ConfigError::InvalidValue("store path cannot be empty".into()));
            }
        }

        if let Some(columns) = &self.columns {
            columns.validate()?;
        }

        Ok(())
    }
}

/// Names of the positional columns of a stored row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnNames {
    pub left: String,
    pub right: String,
    pub level: String,
    pub scope: String,
    pub parent: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            left: "lft".into(),
            right: "rgt".into(),
            level: "lvl".into(),
            scope: "scope".into(),
            parent: "parent_id".into(),
        }
    }
}

impl ColumnNames {
    /// All column names, in `left, right, level, scope, parent` order.
    pub fn all(&self) -> [&str; 5] {
        [
            self.left.as_str(),
            self.right.as_str(),
            self.level.as_str(),
            self.scope.as_str(),
            self.parent.as_str(),
        ]
    }

    /// Validate the column names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = self.all();
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue("column name cannot be empty".into()));
            }
            if RESERVED_FIELDS.contains(name) {
                return Err(ConfigError::InvalidValue(format!(
                    "column name '{name}' is reserved"
                )));
            }
            if names[..i].contains(name) {
                return Err(ConfigError::InvalidValue(format!(
                    "column name '{name}' is used twice"
                )));
            }
        }
        Ok(())
    }
}

/// Tiebreak for ordering siblings during a rebuild.
///
/// A rebuild walks the `parent` column, which carries no order of its own.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SiblingOrder {
    /// Ascending node id. Deterministic even when bounds are garbage.
    #[default]
    Id,
    /// Ascending current left bound, then id. Preserves the existing
    /// order of a tree whose bounds are only partly damaged.
    Left,
}

/// Rebuild settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RebuildConfig {
    /// Sibling tiebreak
    pub sibling_order: Option<SiblingOrder>,

    /// Rows written per checkpoint transaction (0 = one transaction)
    pub batch_size: Option<usize>,
}
