//! P001: `expr::type` cast shorthand is not portable.

use super::rule_url;
use crate::linter::{mask_quoted, LintContext, LintRule};
use crate::sql::SelectStmt;
use crate::types::{position_at, Diagnostic};

pub struct PortableCast;

impl LintRule for PortableCast {
    fn id(&self) -> &'static str {
        "P001"
    }

    fn name(&self) -> &'static str {
        "portable-cast"
    }

    fn description(&self) -> &'static str {
        "`expr::type` casts only parse on postgres-family dialects; use CAST(expr AS type)"
    }

    fn check(&self, _stmt: &SelectStmt, ctx: &LintContext) -> Vec<Diagnostic> {
        let masked = mask_quoted(ctx.sql);
        let mut diagnostics = Vec::new();
        let mut search_from = 0;
        while let Some(rel) = masked[search_from..].find("::") {
            let offset = search_from + rel;
            diagnostics.push(
                Diagnostic::warning(
                    self.id(),
                    format!(
                        "`::` cast is not portable to the `{}` dialect; use CAST(... AS ...)",
                        ctx.dialect
                    ),
                )
                .at(position_at(ctx.sql, offset))
                .with_url(rule_url(self.id())),
            );
            search_from = offset + 2;
        }
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::sql::parse_select;

    #[test]
    fn flags_each_cast_occurrence() {
        // The generic dialect still parses `::`; the rule is about
        // portability of the written SQL.
        let sql = "SELECT a::text, b::int FROM t";
        let stmt = parse_select(sql, Dialect::Postgres).unwrap().unwrap();
        let diagnostics = PortableCast.check(
            &stmt,
            &LintContext {
                sql,
                dialect: Dialect::Bigquery,
            },
        );
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn ignores_casts_inside_strings() {
        let sql = "SELECT 'a::b' FROM t";
        let stmt = parse_select(sql, Dialect::Generic).unwrap().unwrap();
        let diagnostics = PortableCast.check(
            &stmt,
            &LintContext {
                sql,
                dialect: Dialect::Generic,
            },
        );
        assert!(diagnostics.is_empty());
    }
}
