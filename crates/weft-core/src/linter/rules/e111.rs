//! E111: `SELECT *` in a model.
//!
//! Star projections make the model's column list depend on upstream
//! schemas, which degrades lineage for every downstream model.

use super::rule_url;
use crate::linter::{LintContext, LintRule};
use crate::sql::{QueryBody, SelectItem, SelectStmt};
use crate::types::Diagnostic;

pub struct SelectStar;

impl LintRule for SelectStar {
    fn id(&self) -> &'static str {
        "E111"
    }

    fn name(&self) -> &'static str {
        "select-star"
    }

    fn description(&self) -> &'static str {
        "models should enumerate their columns instead of `SELECT *`"
    }

    fn check(&self, stmt: &SelectStmt, _ctx: &LintContext) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        collect(self, &stmt.body, &mut diagnostics);
        diagnostics
    }
}

fn collect(rule: &SelectStar, body: &QueryBody, diagnostics: &mut Vec<Diagnostic>) {
    match body {
        QueryBody::Select(core) => {
            for item in &core.projection {
                if let SelectItem::Star { qualifier, .. } = item {
                    let rendered = match qualifier {
                        Some(q) => format!("{q}.*"),
                        None => "*".to_string(),
                    };
                    diagnostics.push(
                        Diagnostic::warning(
                            rule.id(),
                            format!(
                                "`SELECT {rendered}` hides this model's column list; \
                                 enumerate the columns instead"
                            ),
                        )
                        .at(item.position())
                        .with_url(rule_url(rule.id())),
                    );
                }
            }
        }
        QueryBody::SetOp(op) => {
            collect(rule, &op.left, diagnostics);
            collect(rule, &op.right, diagnostics);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::sql::parse_select;

    fn check(sql: &str) -> Vec<Diagnostic> {
        let stmt = parse_select(sql, Dialect::Generic).unwrap().unwrap();
        SelectStar.check(
            &stmt,
            &LintContext {
                sql,
                dialect: Dialect::Generic,
            },
        )
    }

    #[test]
    fn flags_bare_star() {
        let diagnostics = check("SELECT * FROM t");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn flags_qualified_star() {
        let diagnostics = check("SELECT t.* FROM t");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("t.*"));
    }

    #[test]
    fn explicit_columns_pass() {
        assert!(check("SELECT id, name FROM t").is_empty());
    }
}
