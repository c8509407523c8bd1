//! Column-level lineage analysis.
//!
//! Walks a lowered [`SelectStmt`] and derives the output column list,
//! the set of contributing source columns per output column, the
//! transform kind, and the set of referenced source tables.
//!
//! Resolution is CTE-aware: a CTE name binds to the CTE's analyzed
//! columns (shadowing any real table of the same name), and references
//! resolved through a CTE map to the CTE column's own sources. When a
//! bare column could come from several joined tables, the analyzer
//! prefers the leftmost binding known to declare the column, then the
//! first source in declaration order. Precision degrades instead of
//! failing.

use crate::dialect::Dialect;
use crate::sql::{QueryBody, SelectCore, SelectItem, SelectStmt, SqlExpr, TableRef};
use crate::template::EXPR_PLACEHOLDER;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// How an output column is produced from its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    /// Pass-through of a single source column.
    #[default]
    Direct,
    /// Any computed expression.
    Expression,
}

impl Transform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transform::Direct => "direct",
            Transform::Expression => "expression",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Transform::Direct),
            "expression" => Some(Transform::Expression),
            _ => None,
        }
    }
}

/// One contributing source column of an output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSource {
    pub table: String,
    pub column: String,
}

/// One output column of a SELECT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub index: usize,
    pub transform: Transform,
    /// Outermost function name (lowercase) for single-call expressions,
    /// empty otherwise.
    pub function: String,
    pub sources: Vec<ColumnSource>,
}

/// The lineage derived from one SELECT statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineageResult {
    /// Non-CTE tables referenced anywhere in the statement.
    pub sources: BTreeSet<String>,
    /// Output columns in projection order, indices `0..n-1`.
    pub columns: Vec<ColumnInfo>,
    pub uses_select_star: bool,
}

/// Analyzes a lowered SELECT statement.
pub fn analyze(stmt: &SelectStmt, dialect: Dialect) -> LineageResult {
    let _ = dialect;
    analyze_with_ctes(stmt, &HashMap::new())
}

fn analyze_with_ctes(
    stmt: &SelectStmt,
    outer_ctes: &HashMap<String, LineageResult>,
) -> LineageResult {
    let mut ctes = outer_ctes.clone();
    let mut sources = BTreeSet::new();

    for cte in &stmt.with {
        let mut result = analyze_with_ctes(&cte.query, &ctes);
        // Declared column aliases rename the CTE's outputs.
        for (column, alias) in result.columns.iter_mut().zip(cte.columns.iter()) {
            column.name = alias.clone();
        }
        sources.extend(result.sources.iter().cloned());
        ctes.insert(cte.name.clone(), result);
    }

    let mut body_result = analyze_body(&stmt.body, &ctes);
    body_result.sources.extend(sources);
    body_result
}

fn analyze_body(body: &QueryBody, ctes: &HashMap<String, LineageResult>) -> LineageResult {
    match body {
        QueryBody::Select(core) => analyze_core(core, ctes),
        QueryBody::SetOp(op) => {
            let mut left = analyze_body(&op.left, ctes);
            let right = analyze_body(&op.right, ctes);
            left.sources.extend(right.sources);
            left.uses_select_star |= right.uses_select_star;
            // Under set-operation semantics, column i of the result is
            // fed by column i of every branch.
            for (column, other) in left.columns.iter_mut().zip(right.columns.iter()) {
                for source in &other.sources {
                    if !column.sources.contains(source) {
                        column.sources.push(source.clone());
                    }
                }
            }
            left
        }
    }
}

/// One name visible in the FROM scope.
struct Binding {
    /// The name this relation binds (alias, CTE name, or table name).
    name: String,
    /// Full dotted table name for real tables, `None` for CTEs and
    /// derived tables.
    table: Option<String>,
    /// Known output columns for CTEs and derived tables.
    columns: Option<Vec<ColumnInfo>>,
}

fn analyze_core(core: &SelectCore, ctes: &HashMap<String, LineageResult>) -> LineageResult {
    let mut sources = BTreeSet::new();
    let mut bindings = Vec::new();

    for item in &core.from {
        bind_relation(&item.relation, ctes, &mut bindings, &mut sources);
        for join in &item.joins {
            bind_relation(&join.relation, ctes, &mut bindings, &mut sources);
            if let Some(cond) = &join.condition {
                collect_expr_sources(cond, ctes, &mut sources);
            }
        }
    }

    if let Some(where_clause) = &core.where_clause {
        collect_expr_sources(where_clause, ctes, &mut sources);
    }
    if let Some(having) = &core.having {
        collect_expr_sources(having, ctes, &mut sources);
    }
    for expr in &core.group_by {
        collect_expr_sources(expr, ctes, &mut sources);
    }

    let mut columns = Vec::new();
    let mut uses_select_star = false;

    for item in &core.projection {
        match item {
            SelectItem::Star { qualifier, .. } => {
                uses_select_star = true;
                match qualifier {
                    Some(q) => {
                        if let Some(binding) = find_binding(&bindings, q) {
                            expand_star(binding, &mut columns);
                        }
                    }
                    None => {
                        for binding in &bindings {
                            expand_star(binding, &mut columns);
                        }
                    }
                }
            }
            SelectItem::Column {
                table,
                column,
                alias,
                ..
            } => {
                let sources_for_column =
                    resolve_column(&bindings, table.as_deref(), column);
                columns.push(ColumnInfo {
                    name: alias.clone().unwrap_or_else(|| column.clone()),
                    index: 0,
                    transform: Transform::Direct,
                    function: String::new(),
                    sources: sources_for_column,
                });
            }
            SelectItem::Expression {
                function,
                expr,
                alias,
                ..
            } => {
                let mut column_sources = Vec::new();
                for reference in &expr.column_refs {
                    for source in
                        resolve_column(&bindings, reference.table.as_deref(), &reference.column)
                    {
                        if !column_sources.contains(&source) {
                            column_sources.push(source);
                        }
                    }
                }
                collect_expr_sources(expr, ctes, &mut sources);
                let name = alias
                    .clone()
                    .or_else(|| function.clone())
                    .unwrap_or_else(|| format!("col_{}", columns.len()));
                columns.push(ColumnInfo {
                    name,
                    index: 0,
                    transform: Transform::Expression,
                    function: function.clone().unwrap_or_default(),
                    sources: column_sources,
                });
            }
        }
    }

    for (index, column) in columns.iter_mut().enumerate() {
        column.index = index;
    }

    LineageResult {
        sources,
        columns,
        uses_select_star,
    }
}

fn bind_relation(
    relation: &TableRef,
    ctes: &HashMap<String, LineageResult>,
    bindings: &mut Vec<Binding>,
    sources: &mut BTreeSet<String>,
) {
    let binding_name = relation.binding_name().to_string();
    if let Some(subquery) = &relation.subquery {
        let result = analyze_with_ctes(subquery, ctes);
        sources.extend(result.sources.iter().cloned());
        bindings.push(Binding {
            name: binding_name,
            table: None,
            columns: Some(result.columns),
        });
        return;
    }
    // CTE names shadow real tables of the same name.
    if let Some(cte) = ctes.get(&relation.name) {
        bindings.push(Binding {
            name: binding_name,
            table: None,
            columns: Some(cte.columns.clone()),
        });
        return;
    }
    if relation.name.is_empty() || relation.name == EXPR_PLACEHOLDER {
        bindings.push(Binding {
            name: binding_name,
            table: None,
            columns: None,
        });
        return;
    }
    sources.insert(relation.name.clone());
    bindings.push(Binding {
        name: binding_name,
        table: Some(relation.name.clone()),
        columns: None,
    });
}

fn collect_expr_sources(
    expr: &SqlExpr,
    ctes: &HashMap<String, LineageResult>,
    sources: &mut BTreeSet<String>,
) {
    for subquery in &expr.subqueries {
        let result = analyze_with_ctes(subquery, ctes);
        sources.extend(result.sources);
    }
}

fn find_binding<'a>(bindings: &'a [Binding], qualifier: &str) -> Option<&'a Binding> {
    bindings.iter().find(|binding| {
        binding.name == qualifier
            || binding.table.as_deref() == Some(qualifier)
            || binding
                .table
                .as_deref()
                .and_then(|table| table.rsplit('.').next())
                == Some(qualifier)
    })
}

fn expand_star(binding: &Binding, columns: &mut Vec<ColumnInfo>) {
    if let Some(known) = &binding.columns {
        for column in known {
            columns.push(ColumnInfo {
                name: column.name.clone(),
                index: 0,
                transform: column.transform,
                function: column.function.clone(),
                sources: column.sources.clone(),
            });
        }
    }
    // A real table's columns are unknown here; the `uses_select_star`
    // flag is the downstream signal that the list is incomplete.
}

fn resolve_column(
    bindings: &[Binding],
    qualifier: Option<&str>,
    column: &str,
) -> Vec<ColumnSource> {
    match qualifier {
        Some(qualifier) => match find_binding(bindings, qualifier) {
            Some(binding) => attribute(binding, column),
            // A qualifier that matches nothing in scope is treated as
            // an external table reference.
            None => vec![ColumnSource {
                table: qualifier.to_string(),
                column: column.to_string(),
            }],
        },
        None => {
            // Leftmost binding known to declare the column wins.
            for binding in bindings {
                if let Some(known) = &binding.columns {
                    if known.iter().any(|c| c.name == column) {
                        return attribute(binding, column);
                    }
                }
            }
            // Otherwise the first source whose columns are unknown.
            for binding in bindings {
                if binding.columns.is_none() {
                    return attribute(binding, column);
                }
            }
            match bindings.first() {
                Some(binding) => attribute(binding, column),
                None => Vec::new(),
            }
        }
    }
}

fn attribute(binding: &Binding, column: &str) -> Vec<ColumnSource> {
    if let Some(known) = &binding.columns {
        return known
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.sources.clone())
            .unwrap_or_default();
    }
    match &binding.table {
        Some(table) => vec![ColumnSource {
            table: table.clone(),
            column: column.to_string(),
        }],
        None => Vec::new(),
    }
}
