//! Project discovery and indexing.
//!
//! Walks the configured roots, hashes file contents so unchanged files
//! are skipped, runs the parse pipeline over each model, and persists
//! models, columns, lineage, dependencies and macros. Files tracked in
//! the store but missing from disk are treated as deletions.

use crate::config::ProjectConfig;
use crate::EngineError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use weft_core::dialect::Dialect;
use weft_core::frontmatter;
use weft_core::lineage;
use weft_core::macros::index_script;
use weft_core::sql::parse_select;
use weft_core::template::to_placeholder_sql;
use weft_store::{Model, NewModel, Store};

/// What one discovery pass did.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Model paths indexed or re-indexed.
    pub indexed: Vec<String>,
    /// Files skipped because their hash matched the stored one.
    pub skipped: usize,
    /// File paths whose records were deleted.
    pub deleted: Vec<String>,
    /// Macro namespaces indexed.
    pub macros: Vec<String>,
    /// Files that failed to index, with the reason.
    pub errors: Vec<(PathBuf, String)>,
}

/// Stable content hash used for incremental discovery.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Derives the dotted model path from a file location relative to the
/// models root (`models/staging/users.sql` → `staging.users`).
pub fn model_path_from_file(models_dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(models_dir).unwrap_or(file);
    let mut segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if let Some(last) = segments.last_mut() {
        if let Some(stem) = last.strip_suffix(".sql") {
            *last = stem.to_string();
        }
    }
    segments.join(".")
}

/// Runs one full discovery pass over models and macros.
pub fn discover(
    store: &Store,
    config: &ProjectConfig,
    project_root: &Path,
    dialect: Dialect,
) -> Result<DiscoveryReport, EngineError> {
    let mut report = DiscoveryReport::default();
    let models_dir = project_root.join(&config.models_dir);

    let mut seen_files = Vec::new();
    for entry in WalkDir::new(&models_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let file_key = path.to_string_lossy().into_owned();
        seen_files.push(file_key.clone());

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                report.errors.push((path.to_path_buf(), err.to_string()));
                continue;
            }
        };
        let hash = content_hash(&content);
        if store.get_file_hash(&file_key)?.as_deref() == Some(hash.as_str()) {
            report.skipped += 1;
            continue;
        }

        match index_model(store, &models_dir, path, &content, dialect) {
            Ok(model) => {
                store.set_file_hash(&file_key, &hash)?;
                report.indexed.push(model.path);
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed to index model");
                report.errors.push((path.to_path_buf(), err.to_string()));
            }
        }
    }

    // Macro scripts: one namespace per file.
    if let Some(macros_dir) = &config.macros_dir {
        let macros_root = project_root.join(macros_dir);
        for entry in WalkDir::new(&macros_root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            let file_key = path.to_string_lossy().into_owned();
            seen_files.push(file_key.clone());
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    report.errors.push((path.to_path_buf(), err.to_string()));
                    continue;
                }
            };
            let hash = content_hash(&content);
            if store.get_file_hash(&file_key)?.as_deref() == Some(hash.as_str()) {
                report.skipped += 1;
                continue;
            }
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let namespace = index_script(&name, &file_key, &content);
            store.save_macro_namespace(&namespace)?;
            store.set_file_hash(&file_key, &hash)?;
            report.macros.push(name);
        }
    }

    // Deletions: tracked files that no longer exist on disk.
    for tracked in store.list_tracked_files()? {
        if seen_files.contains(&tracked) || Path::new(&tracked).exists() {
            continue;
        }
        debug!(file = %tracked, "tracked file disappeared, deleting records");
        if tracked.ends_with(".py") {
            let name = Path::new(&tracked)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            store.delete_macro_namespace(&name)?;
        } else {
            store.delete_models_by_file_path(&tracked)?;
        }
        store.delete_file_hash(&tracked)?;
        report.deleted.push(tracked);
    }

    // Dependencies resolve after every model of this pass is
    // registered, so forward references land.
    resolve_dependencies(store)?;

    info!(
        indexed = report.indexed.len(),
        skipped = report.skipped,
        deleted = report.deleted.len(),
        macros = report.macros.len(),
        errors = report.errors.len(),
        "discovery pass complete"
    );
    Ok(report)
}

/// Parses and persists one model file. Shared by discovery and the
/// editor's save path.
pub fn index_model(
    store: &Store,
    models_dir: &Path,
    file: &Path,
    content: &str,
    dialect: Dialect,
) -> Result<Model, EngineError> {
    let front = frontmatter::extract(content);
    let model_path = model_path_from_file(models_dir, file);
    let placeholder = to_placeholder_sql(content);

    let analysis = match parse_select(&placeholder, dialect) {
        Ok(Some(stmt)) => Some(lineage::analyze(&stmt, dialect)),
        Ok(None) => None,
        // A SQL error is a diagnostic, not an indexing failure: the
        // model row stays current while the file is broken.
        Err(_) => None,
    };

    let default_name = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| model_path.clone());
    let header = front.header;
    let model = store.register_model(&NewModel {
        path: model_path.clone(),
        name: header.name.unwrap_or(default_name),
        materialized: header.materialized.unwrap_or_default(),
        unique_key: header.unique_key,
        file_path: file.to_string_lossy().into_owned(),
        owner: header.owner,
        schema: header.schema,
        tags: header.tags,
        tests: header.tests,
        meta: header.meta,
        uses_select_star: analysis.as_ref().map(|a| a.uses_select_star).unwrap_or(false),
        content_hash: content_hash(content),
        sql_content: placeholder,
        raw_content: content.to_string(),
        description: header.description,
    })?;

    match &analysis {
        Some(result) => store.save_model_columns(&model.path, &result.columns)?,
        None => store.delete_model_columns(&model.path)?,
    }
    Ok(model)
}

/// Recomputes every model's dependency edges from its lineage sources,
/// matching source tables to models by path or by name.
pub fn resolve_dependencies(store: &Store) -> Result<(), EngineError> {
    let models = store.list_models()?;
    let mut by_key: HashMap<&str, i64> = HashMap::new();
    for model in &models {
        by_key.insert(model.path.as_str(), model.id);
        by_key.entry(model.name.as_str()).or_insert(model.id);
    }

    let columns = store.batch_get_all_columns()?;
    for model in &models {
        let mut parents = Vec::new();
        if let Some(model_columns) = columns.get(&model.path) {
            for column in model_columns {
                for source in &column.sources {
                    if let Some(parent_id) = by_key.get(source.table.as_str()) {
                        if *parent_id != model.id && !parents.contains(parent_id) {
                            parents.push(*parent_id);
                        }
                    }
                }
            }
        }
        parents.sort();
        store.set_dependencies(model.id, &parents)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn project() -> (tempfile::TempDir, ProjectConfig) {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "models/staging/users.sql",
            "/*---\nname: users\n---*/\nSELECT id, email FROM raw.users",
        );
        write(
            dir.path(),
            "models/marts/enriched.sql",
            "SELECT id FROM staging.users",
        );
        write(
            dir.path(),
            "macros/helpers.py",
            "def full_name(first, last):\n    \"\"\"Joins names.\"\"\"\n    return first\n",
        );
        let config = ProjectConfig {
            models_dir: "models".into(),
            macros_dir: Some("macros".into()),
            ..Default::default()
        };
        (dir, config)
    }

    #[test]
    fn model_path_derivation() {
        assert_eq!(
            model_path_from_file(Path::new("models"), Path::new("models/staging/users.sql")),
            "staging.users"
        );
        assert_eq!(
            model_path_from_file(Path::new("models"), Path::new("models/orders.sql")),
            "orders"
        );
    }

    #[test]
    fn discovery_indexes_models_macros_and_dependencies() {
        let (dir, config) = project();
        let store = Store::open_in_memory().unwrap();
        let report = discover(&store, &config, dir.path(), Dialect::Generic).unwrap();

        assert_eq!(report.indexed.len(), 2);
        assert_eq!(report.macros, vec!["helpers"]);
        assert!(report.errors.is_empty());

        let users = store.get_model_by_path("staging.users").unwrap();
        assert_eq!(users.name, "users");
        let columns = store.get_model_columns("staging.users").unwrap();
        assert_eq!(columns.len(), 2);

        // marts.enriched depends on staging.users, matched by path.
        let enriched = store.get_model_by_path("marts.enriched").unwrap();
        assert_eq!(store.get_parents(enriched.id).unwrap(), vec![users.id]);
    }

    #[test]
    fn unchanged_files_are_skipped_on_the_second_pass() {
        let (dir, config) = project();
        let store = Store::open_in_memory().unwrap();
        discover(&store, &config, dir.path(), Dialect::Generic).unwrap();
        let second = discover(&store, &config, dir.path(), Dialect::Generic).unwrap();
        assert!(second.indexed.is_empty());
        assert_eq!(second.skipped, 3);
    }

    #[test]
    fn deleted_files_cascade_their_records() {
        let (dir, config) = project();
        let store = Store::open_in_memory().unwrap();
        discover(&store, &config, dir.path(), Dialect::Generic).unwrap();

        fs::remove_file(dir.path().join("models/marts/enriched.sql")).unwrap();
        fs::remove_file(dir.path().join("macros/helpers.py")).unwrap();
        let report = discover(&store, &config, dir.path(), Dialect::Generic).unwrap();

        assert_eq!(report.deleted.len(), 2);
        assert!(store.get_model_by_path("marts.enriched").is_err());
        assert!(store.get_macro_namespace("helpers").is_err());
    }

    #[test]
    fn broken_sql_still_registers_the_model() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "models/broken.sql", "SELECT FROM FROM");
        let config = ProjectConfig {
            models_dir: "models".into(),
            ..Default::default()
        };
        let store = Store::open_in_memory().unwrap();
        let report = discover(&store, &config, dir.path(), Dialect::Generic).unwrap();
        assert_eq!(report.indexed, vec!["broken"]);
        assert!(store.get_model_columns("broken").unwrap().is_empty());
    }
}
