//! `weft run` — materialize models in dependency order.

use super::{load_config, open_store};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;
use weft_engine::config::STATE_DIR;
use weft_engine::dag::{execute_run, RunOptions};
use weft_engine::discovery;
use weft_engine::driver::SqliteDriver;
use weft_engine::eval::MinijinjaEval;
use weft_engine::provider::ProjectContext;
use weft_engine::seeds::load_seeds;
use weft_store::{ModelRunStatus, RunStatus};

pub fn run(project: &Path, environment: Option<&str>, select: &[String], seeds: bool) -> Result<i32> {
    let config = load_config(project)?;
    let dialect = config.dialect()?;
    let store = open_store(project)?;
    discovery::discover(&store, &config, project, dialect)?;

    let target = config.resolved_target(environment)?;
    // Local targets materialize into an embedded warehouse under the
    // state directory; a configured database path overrides it.
    let warehouse_path = target
        .database
        .clone()
        .map(|db| project.join(db))
        .unwrap_or_else(|| project.join(STATE_DIR).join("warehouse.db"));
    if let Some(parent) = warehouse_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let driver = SqliteDriver::open(&warehouse_path)?;

    if seeds {
        if let Some(seeds_dir) = &config.seeds_dir {
            for seed in load_seeds(&project.join(seeds_dir), &driver)? {
                println!("{} seed {} ({} rows)", "loaded".green(), seed.table, seed.rows);
            }
        }
    }

    let context = ProjectContext::build(Arc::clone(&store))?;
    let options = RunOptions {
        environment: environment.unwrap_or("default").to_string(),
        select: select.to_vec(),
        config: serde_json::to_value(&config)?,
        env_vars: std::env::vars().collect(),
        target: serde_json::to_value(&target)?,
    };
    let outcome = execute_run(&context, &store, &driver, &MinijinjaEval, &options)?;

    for (path, status) in &outcome.results {
        let rendered = match status {
            ModelRunStatus::Success => "ok".green().to_string(),
            ModelRunStatus::Failed => "failed".red().to_string(),
            ModelRunStatus::Skipped => "skipped".yellow().to_string(),
            other => other.to_string(),
        };
        println!("{rendered:>8}  {path}");
    }
    println!("run {} finished: {}", outcome.run_id, outcome.status);
    Ok(if outcome.status == RunStatus::Completed {
        0
    } else {
        1
    })
}
