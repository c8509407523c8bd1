//! Read models backing the docs surfaces: model listings, external
//! source inventory, dependency paths and the column-lineage graph.

use crate::error::Result;
use crate::types::{DocsModel, LineageEdge, LineageNode, SourceColumn};
use crate::Store;
use std::collections::{BTreeMap, BTreeSet};
use weft_core::frontmatter::Materialized;

impl Store {
    /// All models ordered by path, with the folder derived from the
    /// dotted path (everything before the final segment).
    pub fn docs_models(&self) -> Result<Vec<DocsModel>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT path, name, materialized, description FROM models ORDER BY path",
            )?;
            let rows = stmt.query_map([], |row| {
                let path: String = row.get(0)?;
                let materialized_raw: String = row.get(2)?;
                let folder = match path.rfind('.') {
                    Some(idx) => path[..idx].to_string(),
                    None => String::new(),
                };
                Ok(DocsModel {
                    folder,
                    path,
                    name: row.get(1)?,
                    materialized: Materialized::from_str_opt(&materialized_raw)
                        .unwrap_or_default(),
                    description: row.get(3)?,
                })
            })?;
            let models = rows.collect::<std::result::Result<_, _>>()?;
            Ok(models)
        })
    }

    /// Columns referenced from tables that are not themselves models:
    /// the project's external source inventory.
    pub fn source_columns(&self) -> Result<Vec<SourceColumn>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cl.source_table, cl.source_column, cl.model_path FROM column_lineage cl \
                 WHERE cl.source_table NOT IN (SELECT path FROM models) \
                   AND cl.source_table NOT IN (SELECT name FROM models) \
                 ORDER BY cl.source_table, cl.source_column, cl.model_path",
            )?;
            let mut grouped: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (table, column, model_path) = row?;
                grouped.entry((table, column)).or_default().insert(model_path);
            }
            Ok(grouped
                .into_iter()
                .map(|((source_table, column), referenced_by)| SourceColumn {
                    source_table,
                    column,
                    referenced_by: referenced_by.into_iter().collect(),
                })
                .collect())
        })
    }

    /// Paths of the models a model depends on.
    pub fn dependency_paths(&self, model_path: &str) -> Result<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.path FROM model_dependencies d \
                 JOIN models m ON m.id = d.model_id \
                 JOIN models p ON p.id = d.parent_id \
                 WHERE m.path = ?1 ORDER BY p.path",
            )?;
            let paths = stmt
                .query_map([model_path], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            Ok(paths)
        })
    }

    /// Paths of the models that depend on a model.
    pub fn dependent_paths(&self, model_path: &str) -> Result<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.path FROM model_dependencies d \
                 JOIN models m ON m.id = d.model_id \
                 JOIN models p ON p.id = d.parent_id \
                 WHERE p.path = ?1 ORDER BY m.path",
            )?;
            let paths = stmt
                .query_map([model_path], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            Ok(paths)
        })
    }

    /// The whole column-lineage graph: one node per distinct column,
    /// one edge per lineage row.
    pub fn lineage_graph(&self) -> Result<(Vec<LineageNode>, Vec<LineageEdge>)> {
        self.read(|conn| {
            let model_keys: BTreeSet<String> = {
                let mut stmt = conn.prepare("SELECT path, name FROM models")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let mut keys = BTreeSet::new();
                for row in rows {
                    let (path, name) = row?;
                    keys.insert(path);
                    keys.insert(name);
                }
                keys
            };

            let mut stmt = conn.prepare(
                "SELECT model_path, column_name, source_table, source_column \
                 FROM column_lineage ORDER BY model_path, column_name, id",
            )?;
            let mut nodes: BTreeSet<LineageNode> = BTreeSet::new();
            let mut edges = Vec::new();
            let rows = stmt.query_map([], |row| {
                Ok(LineageEdge {
                    target_model: row.get(0)?,
                    target_column: row.get(1)?,
                    source_table: row.get(2)?,
                    source_column: row.get(3)?,
                })
            })?;
            for row in rows {
                let edge = row?;
                nodes.insert(LineageNode {
                    table: edge.target_model.clone(),
                    column: edge.target_column.clone(),
                    is_model: true,
                });
                nodes.insert(LineageNode {
                    table: edge.source_table.clone(),
                    column: edge.source_column.clone(),
                    is_model: model_keys.contains(&edge.source_table),
                });
                edges.push(edge);
            }
            Ok((nodes.into_iter().collect(), edges))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewModel;
    use weft_core::lineage::{ColumnInfo, ColumnSource, Transform};

    fn register(store: &Store, path: &str) -> i64 {
        store
            .register_model(&NewModel {
                path: path.into(),
                name: path.rsplit('.').next().unwrap_or(path).into(),
                file_path: format!("models/{}.sql", path.replace('.', "/")),
                content_hash: "h".into(),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    fn column(name: &str, table: &str, source: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.into(),
            index: 0,
            transform: Transform::Direct,
            function: String::new(),
            sources: vec![ColumnSource {
                table: table.into(),
                column: source.into(),
            }],
        }
    }

    #[test]
    fn docs_models_derive_folders() {
        let store = Store::open_in_memory().unwrap();
        register(&store, "staging.users");
        register(&store, "orders");
        let models = store.docs_models().unwrap();
        assert_eq!(models[0].path, "orders");
        assert_eq!(models[0].folder, "");
        assert_eq!(models[1].path, "staging.users");
        assert_eq!(models[1].folder, "staging");
    }

    #[test]
    fn source_columns_exclude_model_tables() {
        let store = Store::open_in_memory().unwrap();
        register(&store, "staging.users");
        register(&store, "marts.enriched");
        store
            .save_model_columns("staging.users", &[column("id", "raw.users", "id")])
            .unwrap();
        // This edge points at another model, so it is not an external
        // source.
        store
            .save_model_columns("marts.enriched", &[column("id", "staging.users", "id")])
            .unwrap();

        let sources = store.source_columns().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source_table, "raw.users");
        assert_eq!(sources[0].column, "id");
        assert_eq!(sources[0].referenced_by, vec!["staging.users"]);
    }

    #[test]
    fn dependency_and_dependent_paths() {
        let store = Store::open_in_memory().unwrap();
        let a = register(&store, "staging.users");
        let b = register(&store, "marts.enriched");
        store.set_dependencies(b, &[a]).unwrap();
        assert_eq!(
            store.dependency_paths("marts.enriched").unwrap(),
            vec!["staging.users"]
        );
        assert_eq!(
            store.dependent_paths("staging.users").unwrap(),
            vec!["marts.enriched"]
        );
    }

    #[test]
    fn lineage_graph_marks_model_sources() {
        let store = Store::open_in_memory().unwrap();
        register(&store, "staging.users");
        register(&store, "marts.enriched");
        store
            .save_model_columns("staging.users", &[column("id", "raw.users", "id")])
            .unwrap();
        store
            .save_model_columns("marts.enriched", &[column("id", "staging.users", "id")])
            .unwrap();

        let (nodes, edges) = store.lineage_graph().unwrap();
        assert_eq!(edges.len(), 2);
        let raw = nodes
            .iter()
            .find(|n| n.table == "raw.users")
            .unwrap();
        assert!(!raw.is_model);
        let staged = nodes
            .iter()
            .find(|n| n.table == "staging.users" && !n.column.is_empty())
            .unwrap();
        assert!(staged.is_model);
    }
}
