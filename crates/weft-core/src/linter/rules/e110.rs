//! E110: column reference through an alias the FROM clause never
//! declares.

use super::rule_url;
use crate::linter::{LintContext, LintRule};
use crate::sql::{QueryBody, SelectCore, SelectItem, SelectStmt};
use crate::types::Diagnostic;
use std::collections::HashSet;

pub struct UndeclaredAlias;

impl LintRule for UndeclaredAlias {
    fn id(&self) -> &'static str {
        "E110"
    }

    fn name(&self) -> &'static str {
        "undeclared-alias"
    }

    fn description(&self) -> &'static str {
        "column references must use a table or alias declared in FROM"
    }

    fn check(&self, stmt: &SelectStmt, _ctx: &LintContext) -> Vec<Diagnostic> {
        let cte_names: HashSet<&str> = stmt.with.iter().map(|c| c.name.as_str()).collect();
        let mut diagnostics = Vec::new();
        check_body(self, &stmt.body, &cte_names, &mut diagnostics);
        diagnostics
    }
}

fn check_body(
    rule: &UndeclaredAlias,
    body: &QueryBody,
    cte_names: &HashSet<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match body {
        QueryBody::Select(core) => check_core(rule, core, cte_names, diagnostics),
        QueryBody::SetOp(op) => {
            check_body(rule, &op.left, cte_names, diagnostics);
            check_body(rule, &op.right, cte_names, diagnostics);
        }
    }
}

fn check_core(
    rule: &UndeclaredAlias,
    core: &SelectCore,
    cte_names: &HashSet<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut declared: HashSet<String> = HashSet::new();
    let mut declare = |name: &str| {
        if !name.is_empty() {
            declared.insert(name.to_string());
            if let Some(last) = name.rsplit('.').next() {
                declared.insert(last.to_string());
            }
        }
    };
    for item in &core.from {
        declare(item.relation.binding_name());
        declare(&item.relation.name);
        for join in &item.joins {
            declare(join.relation.binding_name());
            declare(&join.relation.name);
        }
    }

    for item in &core.projection {
        let qualifiers: Vec<(&str, crate::types::Position)> = match item {
            SelectItem::Column {
                table: Some(table), ..
            } => vec![(table.as_str(), item.position())],
            SelectItem::Expression { expr, .. } => expr
                .column_refs
                .iter()
                .filter_map(|r| r.table.as_deref().map(|t| (t, item.position())))
                .collect(),
            _ => Vec::new(),
        };
        for (qualifier, position) in qualifiers {
            let known = declared.contains(qualifier) || cte_names.contains(qualifier);
            if !known {
                diagnostics.push(
                    Diagnostic::error(
                        rule.id(),
                        format!("`{qualifier}` is not declared in the FROM clause"),
                    )
                    .at(position)
                    .with_url(rule_url(rule.id())),
                );
            }
        }
    }
}
