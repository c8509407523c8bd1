//! `weft clean` — delete the project's state directory.

use anyhow::{Context, Result};
use std::path::Path;
use weft_engine::config::STATE_DIR;

pub fn run(project: &Path) -> Result<i32> {
    let state_dir = project.join(STATE_DIR);
    if !state_dir.exists() {
        println!("nothing to clean");
        return Ok(0);
    }
    std::fs::remove_dir_all(&state_dir)
        .with_context(|| format!("removing {}", state_dir.display()))?;
    println!("removed {}", state_dir.display());
    Ok(0)
}
