//! Column and column-lineage persistence.

use crate::error::Result;
use crate::Store;
use rusqlite::params;
use std::collections::HashMap;
use weft_core::lineage::{ColumnInfo, ColumnSource, Transform};

impl Store {
    /// Replaces a model's columns and lineage in one transaction: old
    /// lineage out, old columns out, new columns in, new lineage in.
    pub fn save_model_columns(&self, model_path: &str, columns: &[ColumnInfo]) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM column_lineage WHERE model_path = ?1",
                [model_path],
            )?;
            tx.execute(
                "DELETE FROM model_columns WHERE model_path = ?1",
                [model_path],
            )?;
            let mut insert_column = tx.prepare(
                "INSERT INTO model_columns (model_path, name, column_index, transform, function) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut insert_edge = tx.prepare(
                "INSERT INTO column_lineage (model_path, column_name, source_table, \
                 source_column) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for column in columns {
                insert_column.execute(params![
                    model_path,
                    column.name,
                    column.index as i64,
                    column.transform.as_str(),
                    column.function,
                ])?;
                for source in &column.sources {
                    insert_edge.execute(params![
                        model_path,
                        column.name,
                        source.table,
                        source.column,
                    ])?;
                }
            }
            Ok(())
        })
    }

    /// A model's columns in index order, with their lineage edges
    /// attached.
    pub fn get_model_columns(&self, model_path: &str) -> Result<Vec<ColumnInfo>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, column_index, transform, function FROM model_columns \
                 WHERE model_path = ?1 ORDER BY column_index",
            )?;
            let mut columns: Vec<ColumnInfo> = stmt
                .query_map([model_path], |row| {
                    let transform_raw: String = row.get(2)?;
                    Ok(ColumnInfo {
                        name: row.get(0)?,
                        index: row.get::<_, i64>(1)? as usize,
                        transform: Transform::from_str_opt(&transform_raw).unwrap_or_default(),
                        function: row.get(3)?,
                        sources: Vec::new(),
                    })
                })?
                .collect::<std::result::Result<_, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT column_name, source_table, source_column FROM column_lineage \
                 WHERE model_path = ?1 ORDER BY id",
            )?;
            let edges = stmt.query_map([model_path], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    ColumnSource {
                        table: row.get(1)?,
                        column: row.get(2)?,
                    },
                ))
            })?;
            for edge in edges {
                let (column_name, source) = edge?;
                if let Some(column) = columns.iter_mut().find(|c| c.name == column_name) {
                    column.sources.push(source);
                }
            }
            Ok(columns)
        })
    }

    pub fn delete_model_columns(&self, model_path: &str) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM column_lineage WHERE model_path = ?1",
                [model_path],
            )?;
            tx.execute(
                "DELETE FROM model_columns WHERE model_path = ?1",
                [model_path],
            )?;
            Ok(())
        })
    }

    /// Every model's columns in two queries, keyed by model path.
    pub fn batch_get_all_columns(&self) -> Result<HashMap<String, Vec<ColumnInfo>>> {
        self.read(|conn| {
            let mut map: HashMap<String, Vec<ColumnInfo>> = HashMap::new();
            let mut stmt = conn.prepare(
                "SELECT model_path, name, column_index, transform, function \
                 FROM model_columns ORDER BY model_path, column_index",
            )?;
            let rows = stmt.query_map([], |row| {
                let transform_raw: String = row.get(3)?;
                Ok((
                    row.get::<_, String>(0)?,
                    ColumnInfo {
                        name: row.get(1)?,
                        index: row.get::<_, i64>(2)? as usize,
                        transform: Transform::from_str_opt(&transform_raw).unwrap_or_default(),
                        function: row.get(4)?,
                        sources: Vec::new(),
                    },
                ))
            })?;
            for row in rows {
                let (path, column) = row?;
                map.entry(path).or_default().push(column);
            }

            let mut stmt = conn.prepare(
                "SELECT model_path, column_name, source_table, source_column \
                 FROM column_lineage ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    ColumnSource {
                        table: row.get(2)?,
                        column: row.get(3)?,
                    },
                ))
            })?;
            for row in rows {
                let (path, column_name, source) = row?;
                if let Some(columns) = map.get_mut(&path) {
                    if let Some(column) = columns.iter_mut().find(|c| c.name == column_name) {
                        column.sources.push(source);
                    }
                }
            }
            Ok(map)
        })
    }
}
