//! Project-level health rules.
//!
//! These run over the batch-loaded [`ProjectContext`] and produce
//! file-scoped diagnostics:
//!
//! - `PL01` — dependency cycles (one diagnostic per member of each
//!   strongly-connected component of size > 1)
//! - `PL02` — orphaned models (no dependencies and no dependents)
//! - `PL03` — select-star propagation (a model depends on a parent
//!   whose column list is hidden behind `SELECT *`)
//! - `PL05` — schema drift against the latest successful snapshot

use crate::provider::ProjectContext;
use crate::EngineError;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use weft_core::types::Diagnostic;

/// A diagnostic attached to a model's source file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDiagnostic {
    pub model_path: String,
    pub file_path: String,
    pub diagnostic: Diagnostic,
}

/// Runs every project rule.
pub fn run_project_rules(context: &ProjectContext) -> Result<Vec<ProjectDiagnostic>, EngineError> {
    let mut diagnostics = Vec::new();
    check_cycles(context, &mut diagnostics);
    check_orphans(context, &mut diagnostics);
    check_select_star_propagation(context, &mut diagnostics);
    check_schema_drift(context, &mut diagnostics)?;
    Ok(diagnostics)
}

fn push(
    diagnostics: &mut Vec<ProjectDiagnostic>,
    context: &ProjectContext,
    model_path: &str,
    diagnostic: Diagnostic,
) {
    let file_path = context
        .models
        .get(model_path)
        .map(|m| m.file_path.clone())
        .unwrap_or_default();
    diagnostics.push(ProjectDiagnostic {
        model_path: model_path.to_string(),
        file_path,
        diagnostic,
    });
}

fn check_cycles(context: &ProjectContext, diagnostics: &mut Vec<ProjectDiagnostic>) {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for path in context.models.keys() {
        nodes.insert(path.as_str(), graph.add_node(path.as_str()));
    }
    for (child, parents) in &context.parents {
        for parent in parents {
            if let (Some(&from), Some(&to)) =
                (nodes.get(parent.as_str()), nodes.get(child.as_str()))
            {
                graph.add_edge(from, to, ());
            }
        }
    }

    for component in tarjan_scc(&graph) {
        if component.len() < 2 {
            continue;
        }
        let mut members: Vec<&str> = component.iter().map(|idx| graph[*idx]).collect();
        members.sort();
        let rendered = members.join(" -> ");
        for member in &members {
            push(
                diagnostics,
                context,
                member,
                Diagnostic::error(
                    "PL01",
                    format!("model is part of a dependency cycle: {rendered}"),
                ),
            );
        }
    }
}

fn check_orphans(context: &ProjectContext, diagnostics: &mut Vec<ProjectDiagnostic>) {
    for path in context.models.keys() {
        let has_parents = context.parents.get(path).map(|p| !p.is_empty()).unwrap_or(false);
        let has_children = context.children.get(path).map(|c| !c.is_empty()).unwrap_or(false);
        if !has_parents && !has_children {
            push(
                diagnostics,
                context,
                path,
                Diagnostic::info(
                    "PL02",
                    "model is not connected to any other model in the project",
                ),
            );
        }
    }
}

fn check_select_star_propagation(
    context: &ProjectContext,
    diagnostics: &mut Vec<ProjectDiagnostic>,
) {
    for (path, parents) in &context.parents {
        for parent in parents {
            let Some(parent_info) = context.models.get(parent) else {
                continue;
            };
            if parent_info.uses_select_star {
                push(
                    diagnostics,
                    context,
                    path,
                    Diagnostic::warning(
                        "PL03",
                        format!(
                            "depends on `{parent}`, whose column list is hidden behind \
                             `SELECT *`; lineage below this point is incomplete"
                        ),
                    ),
                );
            }
        }
    }
}

fn check_schema_drift(
    context: &ProjectContext,
    diagnostics: &mut Vec<ProjectDiagnostic>,
) -> Result<(), EngineError> {
    for path in context.models.keys() {
        for (source_table, current) in context.source_columns_of(path) {
            let snapshot = context.store.latest_snapshot(&source_table)?;
            if snapshot.is_empty() {
                continue;
            }
            let snapshot_columns: Vec<String> =
                snapshot.iter().map(|c| c.column_name.clone()).collect();
            if snapshot_columns == current {
                continue;
            }

            let added: Vec<&String> = current
                .iter()
                .filter(|c| !snapshot_columns.contains(c))
                .collect();
            let removed: Vec<&String> = snapshot_columns
                .iter()
                .filter(|c| !current.contains(c))
                .collect();
            let message = if added.is_empty() && removed.is_empty() {
                format!("columns of `{source_table}` changed order since the last run")
            } else {
                let mut parts = Vec::new();
                if !added.is_empty() {
                    parts.push(format!(
                        "added: {}",
                        added.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    ));
                }
                if !removed.is_empty() {
                    parts.push(format!(
                        "removed: {}",
                        removed.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    ));
                }
                format!(
                    "schema of `{source_table}` drifted since the last run ({})",
                    parts.join("; ")
                )
            };
            push(diagnostics, context, path, Diagnostic::warning("PL05", message));
        }
    }
    Ok(())
}
