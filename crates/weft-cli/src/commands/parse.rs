//! `weft parse` — discover and index the project.

use super::{load_config, open_store};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use weft_engine::discovery;

pub fn run(project: &Path) -> Result<i32> {
    let config = load_config(project)?;
    let dialect = config.dialect()?;
    let store = open_store(project)?;

    let report = discovery::discover(&store, &config, project, dialect)?;

    for path in &report.indexed {
        println!("{} {path}", "indexed".green());
    }
    for path in &report.deleted {
        println!("{} {path}", "deleted".yellow());
    }
    for name in &report.macros {
        println!("{} macro namespace {name}", "indexed".green());
    }
    for (file, reason) in &report.errors {
        println!("{} {}: {reason}", "error".red(), file.display());
    }
    println!(
        "{} models, {} unchanged, {} deleted, {} errors",
        report.indexed.len(),
        report.skipped,
        report.deleted.len(),
        report.errors.len()
    );
    Ok(if report.errors.is_empty() { 0 } else { 1 })
}
