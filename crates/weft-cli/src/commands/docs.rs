//! `weft docs` — project documentation queries.

use super::open_store;
use anyhow::Result;
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ModelRow {
    path: String,
    folder: String,
    materialized: String,
    description: String,
}

#[derive(Tabled)]
struct SourceRow {
    source_table: String,
    column: String,
    referenced_by: String,
}

pub fn run(project: &Path, search: Option<&str>) -> Result<i32> {
    let store = open_store(project)?;

    if let Some(query) = search {
        let hits = store.search_models(query)?;
        if hits.is_empty() {
            println!("no models match `{query}`");
            return Ok(0);
        }
        for hit in hits {
            match hit.description {
                Some(description) => println!("{}  {}", hit.path, description),
                None => println!("{}", hit.path),
            }
        }
        return Ok(0);
    }

    let models = store.docs_models()?;
    let rows: Vec<ModelRow> = models
        .iter()
        .map(|m| ModelRow {
            path: m.path.clone(),
            folder: m.folder.clone(),
            materialized: m.materialized.to_string(),
            description: m.description.clone().unwrap_or_default(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{table}");

    for model in &models {
        let parents = store.dependency_paths(&model.path)?;
        let children = store.dependent_paths(&model.path)?;
        if parents.is_empty() && children.is_empty() {
            continue;
        }
        println!("\n{}", model.path);
        if !parents.is_empty() {
            println!("  depends on: {}", parents.join(", "));
        }
        if !children.is_empty() {
            println!("  feeds: {}", children.join(", "));
        }
    }

    let sources = store.source_columns()?;
    if !sources.is_empty() {
        println!("\nexternal sources:");
        let rows: Vec<SourceRow> = sources
            .into_iter()
            .map(|s| SourceRow {
                source_table: s.source_table,
                column: s.column,
                referenced_by: s.referenced_by.join(", "),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{table}");
    }
    Ok(0)
}
