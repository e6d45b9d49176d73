//! store::file
//!
//! Rows persisted to a JSON document.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "next_id": 3,
//!   "rows": [
//!     { "id": 1, "label": "root", "lft": 1, "rgt": 4, "lvl": 1, "scope": 1, "parent_id": null },
//!     { "id": 2, "label": "child", "lft": 2, "rgt": 3, "lvl": 2, "scope": 1, "parent_id": 1 }
//!   ]
//! }
//! ```
//!
//! Positional keys follow the configured [`ColumnNames`]. Detached rows
//! store `null` in all four bound columns.
//!
//! # Concurrency
//!
//! `begin` takes an OS-level exclusive lock on `<store>.lock` via `fs2`
//! and reloads the document, so a transaction always starts from the last
//! commit of any process. `commit` writes the whole document to a temp
//! file and renames it over the store. `rollback` reloads from disk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::memory::MemoryStore;
use super::{BoundColumn, CmpOp, Interval, NodeQuery, NodeRepository, StoreError};
use crate::core::config::ColumnNames;
use crate::core::types::{Node, NodeId, Placement, Scope};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    next_id: u64,
    rows: Vec<Map<String, Value>>,
}

/// JSON-file [`NodeRepository`].
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    columns: ColumnNames,
    rows: MemoryStore,
    lock: Option<File>,
}

impl FileStore {
    /// Create a new, empty store file.
    ///
    /// # Errors
    ///
    /// Fails with an `AlreadyExists` I/O error if the file is present.
    pub fn init(path: &Path, columns: ColumnNames) -> Result<Self, StoreError> {
        if path.exists() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("store '{}' already exists", path.display()),
            )));
        }
        let store = Self {
            path: path.to_path_buf(),
            columns,
            rows: MemoryStore::new(),
            lock: None,
        };
        store.save()?;
        Ok(store)
    }

    /// Open an existing store file.
    pub fn open(path: &Path, columns: ColumnNames) -> Result<Self, StoreError> {
        let store = Self {
            path: path.to_path_buf(),
            columns,
            rows: MemoryStore::new(),
            lock: None,
        };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    /// Every row, placed or detached, by ascending id.
    pub fn all_nodes(&self) -> Result<Vec<Node>, StoreError> {
        self.rows.all_nodes()
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn acquire_file_lock(&mut self) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        file.lock_exclusive()?;
        self.lock = Some(file);
        Ok(())
    }

    fn release_file_lock(&mut self) -> Result<(), StoreError> {
        if let Some(file) = self.lock.take() {
            file.unlock()?;
        }
        Ok(())
    }

    /// Replace the in-memory rows with the file contents.
    fn reload(&self) -> Result<(), StoreError> {
        let contents = fs::read_to_string(&self.path)?;
        let document: Document = serde_json::from_str(&contents)?;
        if document.version != FORMAT_VERSION {
            return Err(StoreError::Malformed(format!(
                "unsupported store version {}",
                document.version
            )));
        }

        let nodes = document
            .rows
            .iter()
            .map(|row| decode_row(row, &self.columns))
            .collect::<Result<Vec<_>, _>>()?;
        self.rows.replace(nodes, document.next_id)
    }

    /// Write every row atomically.
    fn save(&self) -> Result<(), StoreError> {
        let document = Document {
            version: FORMAT_VERSION,
            next_id: self.rows.next_id()?,
            rows: self
                .rows
                .all_nodes()?
                .iter()
                .map(|node| encode_row(node, &self.columns))
                .collect(),
        };
        let contents = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let mut out = File::create(&temp_path)?;
        out.write_all(contents.as_bytes())?;
        out.write_all(b"\n")?;
        out.sync_all()?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn encode_row(node: &Node, columns: &ColumnNames) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("id".into(), node.id.map(NodeId::get).into());
    row.insert("label".into(), node.label.clone().into());

    let p = node.placement;
    row.insert(columns.left.clone(), p.map(|p| p.left).into());
    row.insert(columns.right.clone(), p.map(|p| p.right).into());
    row.insert(columns.level.clone(), p.map(|p| p.level).into());
    row.insert(columns.scope.clone(), p.map(|p| p.scope.get()).into());
    row.insert(columns.parent.clone(), node.parent.map(NodeId::get).into());
    row
}

fn decode_row(row: &Map<String, Value>, columns: &ColumnNames) -> Result<Node, StoreError> {
    let id = row
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| StoreError::Malformed("row without a numeric id".into()))?;
    let label = row
        .get("label")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let int = |name: &str| -> Result<Option<i64>, StoreError> {
        match row.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| {
                StoreError::Malformed(format!("row {id}: '{name}' is not an integer"))
            }),
        }
    };

    let bounds = (
        int(&columns.left)?,
        int(&columns.right)?,
        int(&columns.level)?,
        int(&columns.scope)?,
    );
    let placement = match bounds {
        (Some(left), Some(right), Some(level), Some(scope)) => {
            let scope = u64::try_from(scope)
                .ok()
                .and_then(|s| Scope::new(s).ok())
                .ok_or_else(|| StoreError::Malformed(format!("row {id}: invalid scope {scope}")))?;
            // Bounds are loaded as stored so a damaged tree can be rebuilt.
            Some(Placement {
                left,
                right,
                level,
                scope,
            })
        }
        (None, None, None, None) => None,
        _ => {
            return Err(StoreError::Malformed(format!(
                "row {id}: bound columns must be all set or all null"
            )))
        }
    };

    let parent = int(&columns.parent)?
        .map(|p| {
            u64::try_from(p)
                .map(NodeId::new)
                .map_err(|_| StoreError::Malformed(format!("row {id}: invalid parent {p}")))
        })
        .transpose()?;

    Ok(Node {
        id: Some(NodeId::new(id)),
        label,
        parent,
        placement,
    })
}

impl NodeRepository for FileStore {
    fn load(&self, id: NodeId) -> Result<Option<Node>, StoreError> {
        self.rows.load(id)
    }

    fn load_by_position(&self, scope: Scope, left: i64) -> Result<Option<Node>, StoreError> {
        self.rows.load_by_position(scope, left)
    }

    fn query(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError> {
        self.rows.query(query)
    }

    fn scopes(&self) -> Result<Vec<Scope>, StoreError> {
        self.rows.scopes()
    }

    fn next_scope(&mut self) -> Result<Scope, StoreError> {
        self.rows.next_scope()
    }

    fn insert(&mut self, node: Node) -> Result<Node, StoreError> {
        self.rows.insert(node)
    }

    fn update(&mut self, node: Node) -> Result<Node, StoreError> {
        self.rows.update(node)
    }

    fn update_bounds(
        &mut self,
        scope: Scope,
        column: BoundColumn,
        op: CmpOp,
        threshold: i64,
        delta: i64,
    ) -> Result<usize, StoreError> {
        self.rows.update_bounds(scope, column, op, threshold, delta)
    }

    fn bulk_shift(
        &mut self,
        scope: Scope,
        interval: Interval,
        offset: i64,
        level_offset: i64,
        new_scope: Scope,
    ) -> Result<usize, StoreError> {
        self.rows
            .bulk_shift(scope, interval, offset, level_offset, new_scope)
    }

    fn delete_range(&mut self, scope: Scope, interval: Interval) -> Result<usize, StoreError> {
        self.rows.delete_range(scope, interval)
    }

    fn begin(&mut self, lock_scopes: &[Scope]) -> Result<(), StoreError> {
        if self.rows.in_transaction() {
            return Err(StoreError::TransactionActive);
        }
        self.acquire_file_lock()?;
        let started = self
            .reload()
            .and_then(|()| self.rows.begin(lock_scopes));
        if started.is_err() {
            self.release_file_lock()?;
        }
        started
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.rows.in_transaction() {
            return Err(StoreError::NoTransaction);
        }
        // Still holding the transaction: a failed save can be rolled back.
        self.save()?;
        self.rows.commit()?;
        self.release_file_lock()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let result = self.rows.rollback().and_then(|()| self.reload());
        self.release_file_lock()?;
        result
    }

    fn in_transaction(&self) -> bool {
        self.rows.in_transaction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn root(label: &str) -> Node {
        let mut node = Node::new(label);
        node.placement = Some(Placement::root(Scope::FIRST));
        node
    }

    #[test]
    fn init_then_open_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tree.json");
        FileStore::init(&path, ColumnNames::default()).unwrap();

        let store = FileStore::open(&path, ColumnNames::default()).unwrap();
        assert!(store.all_nodes().unwrap().is_empty());
        assert!(store.scopes().unwrap().is_empty());
    }

    #[test]
    fn init_refuses_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tree.json");
        FileStore::init(&path, ColumnNames::default()).unwrap();
        assert!(FileStore::init(&path, ColumnNames::default()).is_err());
    }

    #[test]
    fn commit_persists_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tree.json");
        let mut store = FileStore::init(&path, ColumnNames::default()).unwrap();

        store.begin(&[Scope::FIRST]).unwrap();
        let saved = store.insert(root("root")).unwrap();
        store.commit().unwrap();

        let reopened = FileStore::open(&path, ColumnNames::default()).unwrap();
        assert_eq!(reopened.load(saved.id.unwrap()).unwrap(), Some(saved));

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""lft": 1"#));
        assert!(raw.contains(r#""parent_id": null"#));
    }

    #[test]
    fn rollback_discards_changes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tree.json");
        let mut store = FileStore::init(&path, ColumnNames::default()).unwrap();

        store.begin(&[Scope::FIRST]).unwrap();
        store.insert(root("root")).unwrap();
        store.rollback().unwrap();

        assert!(store.all_nodes().unwrap().is_empty());
        let reopened = FileStore::open(&path, ColumnNames::default()).unwrap();
        assert!(reopened.all_nodes().unwrap().is_empty());
    }

    #[test]
    fn custom_column_names() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tree.json");
        let columns = ColumnNames {
            left: "l".into(),
            right: "r".into(),
            ..Default::default()
        };
        let mut store = FileStore::init(&path, columns.clone()).unwrap();
        store.begin(&[Scope::FIRST]).unwrap();
        store.insert(root("root")).unwrap();
        store.commit().unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""l": 1"#));
        assert!(!raw.contains("lft"));

        let reopened = FileStore::open(&path, columns).unwrap();
        assert_eq!(reopened.all_nodes().unwrap().len(), 1);
    }

    #[test]
    fn detached_rows_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tree.json");
        let mut store = FileStore::init(&path, ColumnNames::default()).unwrap();
        store.begin(&[]).unwrap();
        let saved = store.insert(Node::new("loose")).unwrap();
        store.commit().unwrap();

        let reopened = FileStore::open(&path, ColumnNames::default()).unwrap();
        let loaded = reopened.load(saved.id.unwrap()).unwrap().unwrap();
        assert!(!loaded.is_placed());
    }

    #[test]
    fn partial_bounds_are_malformed() {
        let mut row = Map::new();
        row.insert("id".into(), 1.into());
        row.insert("lft".into(), 1.into());
        let err = decode_row(&row, &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[test]
    fn open_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let result = FileStore::open(&temp.path().join("absent.json"), ColumnNames::default());
        assert!(matches!(result, Err(StoreError::Io(_))));
    }
}
