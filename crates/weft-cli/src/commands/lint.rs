//! `weft lint` — diagnostics for every model in the project.

use super::{load_config, open_store};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use weft_core::types::{Diagnostic, Severity};
use weft_engine::discovery;
use weft_engine::health::run_project_rules;
use weft_engine::provider::Provider;
use weft_lsp::diagnostics::file_diagnostics;

pub fn run(project: &Path) -> Result<i32> {
    let config = load_config(project)?;
    let dialect = config.dialect()?;
    let store = open_store(project)?;
    discovery::discover(&store, &config, project, dialect)?;

    let provider = Provider::new(Arc::clone(&store), dialect);
    let namespaces = store.list_macro_namespaces()?;
    let context = provider.project_context()?;

    // Project-level diagnostics, grouped by file.
    let mut by_file: HashMap<String, Vec<Diagnostic>> = HashMap::new();
    for project_diagnostic in run_project_rules(&context)? {
        by_file
            .entry(project_diagnostic.file_path.clone())
            .or_default()
            .push(project_diagnostic.diagnostic);
    }

    let mut error_count = 0usize;
    let mut warning_count = 0usize;
    for model in context.models.values() {
        let Ok(content) = std::fs::read_to_string(&model.file_path) else {
            continue;
        };
        let parsed = provider.get_or_parse(&model.file_path, &content, 0);
        let mut diagnostics = file_diagnostics(&parsed, &namespaces);
        diagnostics.extend(by_file.remove(&model.file_path).unwrap_or_default());
        diagnostics.sort_by_key(|d| (d.position, d.severity));

        for diagnostic in &diagnostics {
            let severity = match diagnostic.severity {
                Severity::Error => {
                    error_count += 1;
                    "error".red().to_string()
                }
                Severity::Warning => {
                    warning_count += 1;
                    "warning".yellow().to_string()
                }
                Severity::Info | Severity::Hint => "info".blue().to_string(),
            };
            println!(
                "{}:{}:{}: {severity} [{}] {}",
                model.file_path,
                diagnostic.position.line,
                diagnostic.position.column,
                diagnostic.rule_id,
                diagnostic.message
            );
        }
    }

    println!("{error_count} errors, {warning_count} warnings");
    Ok(if error_count > 0 { 1 } else { 0 })
}
