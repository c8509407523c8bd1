pub mod clean;
pub mod docs;
pub mod lint;
pub mod lsp;
pub mod parse;
pub mod run;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use weft_engine::config::{ProjectConfig, CONFIG_FILE};
use weft_store::Store;

/// Loads the project configuration from the project root.
pub(crate) fn load_config(project: &Path) -> Result<ProjectConfig> {
    ProjectConfig::load(project.join(CONFIG_FILE))
        .with_context(|| format!("loading {}", project.join(CONFIG_FILE).display()))
}

/// Opens (creating if needed) the project's state store.
pub(crate) fn open_store(project: &Path) -> Result<Arc<Store>> {
    let db_path = ProjectConfig::state_db_path(project);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = Store::open(&db_path)
        .with_context(|| format!("opening state store {}", db_path.display()))?;
    Ok(Arc::new(store))
}
