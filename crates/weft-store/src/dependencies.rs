//! Model dependency edges.

use crate::error::Result;
use crate::Store;
use rusqlite::params;
use std::collections::HashMap;

impl Store {
    /// Replaces a model's parent set atomically.
    pub fn set_dependencies(&self, model_id: i64, parent_ids: &[i64]) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM model_dependencies WHERE model_id = ?1",
                [model_id],
            )?;
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO model_dependencies (model_id, parent_id) VALUES (?1, ?2)",
            )?;
            for parent_id in parent_ids {
                insert.execute(params![model_id, parent_id])?;
            }
            Ok(())
        })
    }

    /// Ids of the models this model depends on.
    pub fn get_parents(&self, model_id: i64) -> Result<Vec<i64>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT parent_id FROM model_dependencies WHERE model_id = ?1 ORDER BY parent_id",
            )?;
            let ids = stmt
                .query_map([model_id], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            Ok(ids)
        })
    }

    /// Ids of the models that depend on this model.
    pub fn get_children(&self, parent_id: i64) -> Result<Vec<i64>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT model_id FROM model_dependencies WHERE parent_id = ?1 ORDER BY model_id",
            )?;
            let ids = stmt
                .query_map([parent_id], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            Ok(ids)
        })
    }

    /// Every dependency edge in one query: model id → parent ids.
    pub fn batch_get_all_dependencies(&self) -> Result<HashMap<i64, Vec<i64>>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT model_id, parent_id FROM model_dependencies ORDER BY model_id, parent_id",
            )?;
            let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            for row in rows {
                let (model_id, parent_id): (i64, i64) = row?;
                map.entry(model_id).or_default().push(parent_id);
            }
            Ok(map)
        })
    }

    /// Every dependency edge in one query: parent id → dependent ids.
    pub fn batch_get_all_dependents(&self) -> Result<HashMap<i64, Vec<i64>>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT parent_id, model_id FROM model_dependencies ORDER BY parent_id, model_id",
            )?;
            let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            for row in rows {
                let (parent_id, model_id): (i64, i64) = row?;
                map.entry(parent_id).or_default().push(model_id);
            }
            Ok(map)
        })
    }
}
