//! L002: model bodies should not end with a semicolon.
//!
//! The engine wraps a model's SELECT into materialization DDL; a
//! trailing semicolon breaks the wrapped statement on several
//! warehouses.

use super::rule_url;
use crate::linter::{LintContext, LintRule};
use crate::sql::SelectStmt;
use crate::types::{position_at, Diagnostic, Fix, Span, TextEdit};

pub struct TrailingSemicolon;

impl LintRule for TrailingSemicolon {
    fn id(&self) -> &'static str {
        "L002"
    }

    fn name(&self) -> &'static str {
        "trailing-semicolon"
    }

    fn description(&self) -> &'static str {
        "model bodies should not end with a semicolon"
    }

    fn check(&self, _stmt: &SelectStmt, ctx: &LintContext) -> Vec<Diagnostic> {
        let trimmed = ctx.sql.trim_end();
        if !trimmed.ends_with(';') {
            return Vec::new();
        }
        let offset = trimmed.len() - 1;
        vec![
            Diagnostic::warning(self.id(), "model body ends with a semicolon")
                .at(position_at(ctx.sql, offset))
                .with_url(rule_url(self.id()))
                .with_fix(Fix::new(
                    "Remove trailing semicolon",
                    vec![TextEdit::delete(Span::new(offset, offset + 1))],
                )),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::sql::parse_select;

    fn check(sql: &str) -> Vec<Diagnostic> {
        let stmt = parse_select(sql, Dialect::Generic).unwrap().unwrap();
        TrailingSemicolon.check(
            &stmt,
            &LintContext {
                sql,
                dialect: Dialect::Generic,
            },
        )
    }

    #[test]
    fn flags_trailing_semicolon() {
        let diagnostics = check("SELECT 1;");
        assert_eq!(diagnostics.len(), 1);
        let edit = &diagnostics[0].fixes[0].edits[0];
        assert_eq!((edit.start, edit.end), (8, 9));
        assert!(edit.new_text.is_empty());
    }

    #[test]
    fn flags_semicolon_before_trailing_whitespace() {
        let diagnostics = check("SELECT 1;\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].fixes[0].edits[0].start, 8);
    }

    #[test]
    fn clean_body_passes() {
        assert!(check("SELECT 1").is_empty());
    }
}
