//! Embedded catalog store.
//!
//! A transactional persistence layer over SQLite that tracks models,
//! their columns and per-column lineage, dependency edges, macro
//! namespaces, file hashes, runs, and column snapshots, plus a
//! full-text index over model metadata.
//!
//! Every multi-row mutation that forms a logical unit (set
//! dependencies, save columns with lineage, save a macro namespace
//! with its functions) runs in a single transaction. Analyzers and the
//! DAG engine receive owned snapshots; nothing holds references into
//! the store across writes.
//!
//! The `batch_get_all_*` accessors are the sanctioned path for
//! building a project-wide view: each issues a small, constant number
//! of queries regardless of project size.

mod columns;
mod dependencies;
mod docs;
mod error;
mod hashes;
mod macros;
pub mod migrations;
mod models;
mod runs;
mod search;
mod snapshots;
mod types;

pub use error::{Result, StoreError};
pub use search::SearchHit;
pub use types::{
    DocsModel, Environment, LineageEdge, LineageNode, Model, ModelRun, ModelRunStatus, NewModel,
    Run, RunStatus, SnapshotColumn, SourceColumn,
};

use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Default number of runs whose snapshots are retained per source
/// table.
pub const DEFAULT_SNAPSHOT_RETENTION: usize = 10;

/// The catalog store. Cheap to share behind an `Arc`; the embedded
/// engine serializes access through an internal lock.
pub struct Store {
    conn: Mutex<Option<Connection>>,
    snapshot_retention: usize,
}

impl Store {
    /// Opens (or creates) the store at `path` and applies pending
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opening store");
        Self::from_connection(conn)
    }

    /// An in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::apply(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            snapshot_retention: DEFAULT_SNAPSHOT_RETENTION,
        })
    }

    /// Overrides the snapshot retention policy.
    pub fn with_snapshot_retention(mut self, runs: usize) -> Self {
        self.snapshot_retention = runs.max(1);
        self
    }

    pub(crate) fn snapshot_retention(&self) -> usize {
        self.snapshot_retention
    }

    /// Closes the store. Later calls fail with [`StoreError::NotOpen`].
    pub fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            *guard = None;
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Runs a read-only operation against the connection.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().map_err(|_| StoreError::NotOpen)?;
        let conn = guard.as_ref().ok_or(StoreError::NotOpen)?;
        f(conn)
    }

    /// Runs a mutation inside a transaction, committed on success and
    /// rolled back on any error.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().map_err(|_| StoreError::NotOpen)?;
        let conn = guard.as_mut().ok_or(StoreError::NotOpen)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// The schema version the database is at.
    pub fn schema_version(&self) -> Result<i64> {
        self.read(migrations::version)
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_is_at_latest_version() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.is_open());
        assert_eq!(
            store.schema_version().unwrap(),
            migrations::MIGRATIONS.last().unwrap().version
        );
    }

    #[test]
    fn closed_store_reports_not_open() {
        let store = Store::open_in_memory().unwrap();
        store.close();
        assert!(!store.is_open());
        let err = store.list_models().unwrap_err();
        assert_eq!(err, StoreError::NotOpen);
    }

    #[test]
    fn open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .register_model(&NewModel {
                    path: "staging.users".into(),
                    name: "users".into(),
                    file_path: "models/staging/users.sql".into(),
                    content_hash: "abc".into(),
                    ..Default::default()
                })
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.list_models().unwrap().len(), 1);
    }
}
