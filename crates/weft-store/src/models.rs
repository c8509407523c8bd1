//! Model registration and lookup.

use crate::error::{Result, StoreError};
use crate::types::{Model, NewModel};
use crate::{from_json, to_json, Store};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::debug;
use weft_core::frontmatter::Materialized;

const MODEL_COLUMNS: &str = "id, path, name, materialized, unique_key, file_path, owner, \
     schema_name, tags, tests, meta, uses_select_star, content_hash, sql_content, raw_content, \
     description, created_at, updated_at";

impl Store {
    /// Registers a model, upserting by path. The id and `created_at`
    /// of an existing record are preserved; everything else is
    /// replaced and `updated_at` advances.
    pub fn register_model(&self, model: &NewModel) -> Result<Model> {
        self.write(|tx| {
            let now = Utc::now();
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM models WHERE path = ?1",
                    [&model.path],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(ignore_no_rows)?;

            let id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE models SET name = ?1, materialized = ?2, unique_key = ?3, \
                         file_path = ?4, owner = ?5, schema_name = ?6, tags = ?7, tests = ?8, \
                         meta = ?9, uses_select_star = ?10, content_hash = ?11, \
                         sql_content = ?12, raw_content = ?13, description = ?14, \
                         updated_at = ?15 WHERE id = ?16",
                        params![
                            model.name,
                            model.materialized.as_str(),
                            model.unique_key,
                            model.file_path,
                            model.owner,
                            model.schema,
                            to_json(&model.tags),
                            to_json(&model.tests),
                            to_json(&model.meta),
                            model.uses_select_star,
                            model.content_hash,
                            model.sql_content,
                            model.raw_content,
                            model.description,
                            now,
                            id,
                        ],
                    )?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO models (path, name, materialized, unique_key, file_path, \
                         owner, schema_name, tags, tests, meta, uses_select_star, content_hash, \
                         sql_content, raw_content, description, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                         ?15, ?16, ?17)",
                        params![
                            model.path,
                            model.name,
                            model.materialized.as_str(),
                            model.unique_key,
                            model.file_path,
                            model.owner,
                            model.schema,
                            to_json(&model.tags),
                            to_json(&model.tests),
                            to_json(&model.meta),
                            model.uses_select_star,
                            model.content_hash,
                            model.sql_content,
                            model.raw_content,
                            model.description,
                            now,
                            now,
                        ],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            // Keep the search index in lockstep with the catalog row.
            tx.execute("DELETE FROM models_fts WHERE rowid = ?1", [id])?;
            tx.execute(
                "INSERT INTO models_fts (rowid, name, path, description, sql_content) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    model.name,
                    model.path,
                    model.description.clone().unwrap_or_default(),
                    model.sql_content,
                ],
            )?;

            debug!(path = %model.path, id, "registered model");
            get_model_row(tx, "id = ?1", params![id])?
                .ok_or_else(|| StoreError::not_found("model", model.path.clone()))
        })
    }

    pub fn get_model(&self, id: i64) -> Result<Model> {
        self.read(|conn| {
            get_model_row(conn, "id = ?1", params![id])?
                .ok_or_else(|| StoreError::not_found("model", id.to_string()))
        })
    }

    pub fn get_model_by_path(&self, path: &str) -> Result<Model> {
        self.read(|conn| {
            get_model_row(conn, "path = ?1", params![path])?
                .ok_or_else(|| StoreError::not_found("model", path))
        })
    }

    pub fn get_model_by_file_path(&self, file_path: &str) -> Result<Model> {
        self.read(|conn| {
            get_model_row(conn, "file_path = ?1", params![file_path])?
                .ok_or_else(|| StoreError::not_found("model", file_path))
        })
    }

    /// All models ordered by path.
    pub fn list_models(&self) -> Result<Vec<Model>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MODEL_COLUMNS} FROM models ORDER BY path"
            ))?;
            let rows = stmt.query_map([], row_to_model)?;
            let mut models = Vec::new();
            for row in rows {
                models.push(row??);
            }
            Ok(models)
        })
    }

    /// Deletes every model indexed from `file_path`. Columns, lineage,
    /// dependencies and model runs cascade.
    pub fn delete_models_by_file_path(&self, file_path: &str) -> Result<usize> {
        self.write(|tx| {
            let mut stmt = tx.prepare("SELECT id FROM models WHERE file_path = ?1")?;
            let ids: Vec<i64> = stmt
                .query_map([file_path], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            drop(stmt);
            for id in &ids {
                tx.execute("DELETE FROM models_fts WHERE rowid = ?1", [id])?;
            }
            let deleted = tx.execute("DELETE FROM models WHERE file_path = ?1", [file_path])?;
            Ok(deleted)
        })
    }

    pub fn update_content_hash(&self, path: &str, content_hash: &str) -> Result<()> {
        self.write(|tx| {
            let changed = tx.execute(
                "UPDATE models SET content_hash = ?1, updated_at = ?2 WHERE path = ?3",
                params![content_hash, Utc::now(), path],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("model", path));
            }
            Ok(())
        })
    }
}

fn ignore_no_rows<T>(err: rusqlite::Error) -> std::result::Result<Option<T>, rusqlite::Error> {
    match err {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

fn get_model_row(
    conn: &Connection,
    predicate: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Model>> {
    let sql = format!("SELECT {MODEL_COLUMNS} FROM models WHERE {predicate} LIMIT 1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params, row_to_model)?;
    match rows.next() {
        Some(row) => Ok(Some(row??)),
        None => Ok(None),
    }
}

fn row_to_model(row: &Row<'_>) -> rusqlite::Result<Result<Model>> {
    let materialized_raw: String = row.get(3)?;
    let tags_raw: String = row.get(8)?;
    let tests_raw: String = row.get(9)?;
    let meta_raw: String = row.get(10)?;
    let Some(materialized) = Materialized::from_str_opt(&materialized_raw) else {
        return Ok(Err(StoreError::corrupt(format!(
            "unknown materialization `{materialized_raw}`"
        ))));
    };
    Ok(Ok(Model {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        materialized,
        unique_key: row.get(4)?,
        file_path: row.get(5)?,
        owner: row.get(6)?,
        schema: row.get(7)?,
        tags: from_json(&tags_raw),
        tests: from_json(&tests_raw),
        meta: from_json(&meta_raw),
        uses_select_star: row.get(11)?,
        content_hash: row.get(12)?,
        sql_content: row.get(13)?,
        raw_content: row.get(14)?,
        description: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str) -> NewModel {
        NewModel {
            path: path.into(),
            name: path.rsplit('.').next().unwrap_or(path).into(),
            materialized: Materialized::Table,
            file_path: format!("models/{}.sql", path.replace('.', "/")),
            content_hash: "hash-1".into(),
            sql_content: "SELECT 1".into(),
            raw_content: "SELECT 1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn register_then_get_by_every_key() {
        let store = Store::open_in_memory().unwrap();
        let model = store.register_model(&sample("staging.users")).unwrap();
        assert_eq!(store.get_model(model.id).unwrap().path, "staging.users");
        assert_eq!(store.get_model_by_path("staging.users").unwrap().id, model.id);
        assert_eq!(
            store
                .get_model_by_file_path("models/staging/users.sql")
                .unwrap()
                .id,
            model.id
        );
    }

    #[test]
    fn upsert_preserves_id_and_created_at() {
        let store = Store::open_in_memory().unwrap();
        let first = store.register_model(&sample("staging.users")).unwrap();
        let mut updated = sample("staging.users");
        updated.content_hash = "hash-2".into();
        updated.owner = Some("data-eng".into());
        let second = store.register_model(&updated).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.content_hash, "hash-2");
        assert_eq!(second.owner.as_deref(), Some("data-eng"));
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn missing_model_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.get_model_by_path("nope").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "model", .. }));
    }

    #[test]
    fn list_is_ordered_by_path() {
        let store = Store::open_in_memory().unwrap();
        store.register_model(&sample("marts.orders")).unwrap();
        store.register_model(&sample("staging.users")).unwrap();
        store.register_model(&sample("marts.customers")).unwrap();
        let paths: Vec<_> = store
            .list_models()
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(paths, vec!["marts.customers", "marts.orders", "staging.users"]);
    }

    #[test]
    fn delete_by_file_path_removes_model() {
        let store = Store::open_in_memory().unwrap();
        store.register_model(&sample("staging.users")).unwrap();
        let deleted = store
            .delete_models_by_file_path("models/staging/users.sql")
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_model_by_path("staging.users").is_err());
    }

    #[test]
    fn update_content_hash_touches_updated_at() {
        let store = Store::open_in_memory().unwrap();
        store.register_model(&sample("staging.users")).unwrap();
        store
            .update_content_hash("staging.users", "hash-9")
            .unwrap();
        assert_eq!(
            store.get_model_by_path("staging.users").unwrap().content_hash,
            "hash-9"
        );
        assert!(matches!(
            store.update_content_hash("missing", "x").unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[test]
    fn tags_tests_meta_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let mut model = sample("staging.users");
        model.tags = vec!["core".into(), "daily".into()];
        model.tests = vec!["not_null(id)".into()];
        model
            .meta
            .insert("priority".into(), serde_json::json!(1));
        let saved = store.register_model(&model).unwrap();
        assert_eq!(saved.tags, model.tags);
        assert_eq!(saved.tests, model.tests);
        assert_eq!(saved.meta, model.meta);
    }
}
