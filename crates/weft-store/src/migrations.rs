//! Ordered schema migrations.
//!
//! Every migration has an up and a down script. The store records its
//! version in `schema_migrations` and refuses to open a database whose
//! version is newer than this binary understands.

use crate::error::{Result, StoreError};
use rusqlite::Connection;
use tracing::{debug, info};

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "catalog-tables",
        up: r#"
CREATE TABLE models (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    materialized TEXT NOT NULL DEFAULT 'view'
        CHECK (materialized IN ('table', 'view', 'incremental')),
    unique_key TEXT,
    file_path TEXT NOT NULL,
    owner TEXT,
    schema_name TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    tests TEXT NOT NULL DEFAULT '[]',
    meta TEXT NOT NULL DEFAULT '{}',
    uses_select_star INTEGER NOT NULL DEFAULT 0,
    content_hash TEXT NOT NULL,
    sql_content TEXT NOT NULL DEFAULT '',
    raw_content TEXT NOT NULL DEFAULT '',
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX idx_models_file_path ON models(file_path);

CREATE TABLE model_columns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_path TEXT NOT NULL,
    name TEXT NOT NULL,
    column_index INTEGER NOT NULL,
    transform TEXT NOT NULL DEFAULT 'direct'
        CHECK (transform IN ('direct', 'expression')),
    function TEXT NOT NULL DEFAULT '',
    UNIQUE (model_path, name),
    FOREIGN KEY (model_path) REFERENCES models(path)
        ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE column_lineage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_path TEXT NOT NULL,
    column_name TEXT NOT NULL,
    source_table TEXT NOT NULL,
    source_column TEXT NOT NULL,
    FOREIGN KEY (model_path) REFERENCES models(path)
        ON DELETE CASCADE ON UPDATE CASCADE
);
CREATE INDEX idx_column_lineage_model ON column_lineage(model_path);
CREATE INDEX idx_column_lineage_source ON column_lineage(source_table);

CREATE TABLE model_dependencies (
    model_id INTEGER NOT NULL,
    parent_id INTEGER NOT NULL,
    PRIMARY KEY (model_id, parent_id),
    FOREIGN KEY (model_id) REFERENCES models(id) ON DELETE CASCADE,
    FOREIGN KEY (parent_id) REFERENCES models(id) ON DELETE CASCADE
);

CREATE TABLE macro_namespaces (
    name TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    package TEXT
);

CREATE TABLE macro_functions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    args TEXT NOT NULL DEFAULT '[]',
    docstring TEXT,
    line INTEGER NOT NULL DEFAULT 0,
    UNIQUE (namespace, name),
    FOREIGN KEY (namespace) REFERENCES macro_namespaces(name)
        ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE environments (
    name TEXT PRIMARY KEY,
    commit_ref TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    environment TEXT NOT NULL DEFAULT 'default',
    status TEXT NOT NULL DEFAULT 'running'
        CHECK (status IN ('running', 'completed', 'failed', 'cancelled')),
    started_at TEXT NOT NULL,
    completed_at TEXT,
    error TEXT
);

CREATE TABLE model_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL,
    model_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'running', 'success', 'failed', 'skipped')),
    rows_affected INTEGER NOT NULL DEFAULT 0,
    execution_ms INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE,
    FOREIGN KEY (model_id) REFERENCES models(id) ON DELETE CASCADE
);
CREATE INDEX idx_model_runs_model ON model_runs(model_id);

CREATE TABLE file_hashes (
    file_path TEXT PRIMARY KEY,
    hash TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE column_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_path TEXT NOT NULL,
    source_table TEXT NOT NULL,
    column_name TEXT NOT NULL,
    column_index INTEGER NOT NULL,
    run_id INTEGER NOT NULL,
    snapshot_at TEXT NOT NULL
);
CREATE INDEX idx_snapshots_source ON column_snapshots(source_table, run_id);
"#,
        down: r#"
DROP TABLE IF EXISTS column_snapshots;
DROP TABLE IF EXISTS file_hashes;
DROP TABLE IF EXISTS model_runs;
DROP TABLE IF EXISTS runs;
DROP TABLE IF EXISTS environments;
DROP TABLE IF EXISTS macro_functions;
DROP TABLE IF EXISTS macro_namespaces;
DROP TABLE IF EXISTS model_dependencies;
DROP TABLE IF EXISTS column_lineage;
DROP TABLE IF EXISTS model_columns;
DROP TABLE IF EXISTS models;
"#,
    },
    Migration {
        version: 2,
        name: "model-search",
        up: r#"
CREATE VIRTUAL TABLE models_fts USING fts5(
    name, path, description, sql_content,
    tokenize='porter unicode61'
);
"#,
        down: "DROP TABLE IF EXISTS models_fts;",
    },
];

/// Applies pending migrations, creating the version table on first use.
pub fn apply(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    let latest = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);
    if current > latest {
        return Err(StoreError::corrupt(format!(
            "database schema version {current} is newer than this binary supports ({latest})"
        )));
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            version = migration.version,
            name = migration.name,
            "applying store migration"
        );
        let tx = conn.transaction()?;
        tx.execute_batch(migration.up)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                migration.version,
                migration.name,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
    }
    debug!(version = latest, "store schema up to date");
    Ok(())
}

/// Reverts the newest applied migration. Used by tests and recovery
/// tooling.
pub fn revert_last(conn: &mut Connection) -> Result<()> {
    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    let Some(migration) = MIGRATIONS.iter().find(|m| m.version == current) else {
        return Ok(());
    };
    let tx = conn.transaction()?;
    tx.execute_batch(migration.down)?;
    tx.execute(
        "DELETE FROM schema_migrations WHERE version = ?1",
        [migration.version],
    )?;
    tx.commit()?;
    Ok(())
}

/// The schema version recorded in the database.
pub fn version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_unique() {
        let mut versions: Vec<i64> = MIGRATIONS.iter().map(|m| m.version).collect();
        let original = versions.clone();
        versions.sort();
        versions.dedup();
        assert_eq!(versions, original);
    }

    #[test]
    fn apply_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply(&mut conn).unwrap();
        apply(&mut conn).unwrap();
        assert_eq!(
            version(&conn).unwrap(),
            MIGRATIONS.last().unwrap().version
        );
    }

    #[test]
    fn revert_walks_back_one_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply(&mut conn).unwrap();
        revert_last(&mut conn).unwrap();
        assert_eq!(
            version(&conn).unwrap(),
            MIGRATIONS.last().unwrap().version - 1
        );
    }

    #[test]
    fn future_version_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (999, 'future', '')",
            [],
        )
        .unwrap();
        let err = apply(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
