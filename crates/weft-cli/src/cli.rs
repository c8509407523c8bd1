//! Command-line definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "weft", version, about = "SQL model workflow platform")]
pub struct Cli {
    /// Project root (where weft.yml lives).
    #[arg(long, global = true, default_value = ".")]
    pub project: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover and index models and macros into the state store.
    Parse,
    /// Lint every model and print diagnostics.
    Lint,
    /// Materialize models against the target warehouse.
    Run {
        /// Named environment from weft.yml.
        #[arg(long)]
        env: Option<String>,
        /// Selector expressions (`model`, `+model`, `model+`, `+model+`).
        #[arg(long = "select", value_name = "SELECTOR")]
        select: Vec<String>,
        /// Load seed CSVs before running models.
        #[arg(long)]
        seeds: bool,
    },
    /// Project documentation queries.
    Docs {
        /// Full-text search over model names, paths, descriptions and SQL.
        #[arg(long)]
        search: Option<String>,
    },
    /// Start the language server on stdio.
    Lsp,
    /// Delete the project's state directory.
    Clean,
}
