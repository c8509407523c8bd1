//! Statement-level lint rules.
//!
//! A [`LintRule`] checks one parsed statement and returns diagnostics,
//! optionally carrying autofixes as ordered text edits. Rules register
//! into a dialect-scoped registry: [`rules_for`] composes the shared
//! rules with the ones that only apply under the given dialect.

mod helpers;
pub mod rules;

use crate::dialect::Dialect;
use crate::sql::SelectStmt;
use crate::types::Diagnostic;

pub(crate) use helpers::mask_quoted;

/// Context provided to lint rules.
pub struct LintContext<'a> {
    /// The statement text the rule runs against (placeholder-substituted
    /// body). Byte offsets in fixes index into this text.
    pub sql: &'a str,
    pub dialect: Dialect,
}

/// A single lint rule over a parsed statement.
pub trait LintRule: Send + Sync {
    /// Machine-readable rule code (e.g. "L001").
    fn id(&self) -> &'static str;

    /// Short human-readable name (e.g. "keyword-case").
    fn name(&self) -> &'static str;

    /// What this rule checks.
    fn description(&self) -> &'static str;

    /// Checks a statement and returns any diagnostics found.
    fn check(&self, stmt: &SelectStmt, ctx: &LintContext) -> Vec<Diagnostic>;
}

/// The rules that run under `dialect`: the shared registry plus the
/// dialect-specific portability set.
pub fn rules_for(dialect: Dialect) -> Vec<Box<dyn LintRule>> {
    let mut set: Vec<Box<dyn LintRule>> = vec![
        Box::new(rules::KeywordCase),
        Box::new(rules::TrailingSemicolon),
        Box::new(rules::UndeclaredAlias),
        Box::new(rules::SelectStar),
    ];
    if !dialect.supports_double_colon_cast() {
        set.push(Box::new(rules::PortableCast));
    }
    if !dialect.supports_ilike() {
        set.push(Box::new(rules::PortableIlike));
    }
    set
}

/// Runs every applicable rule over one statement.
pub fn run_rules(stmt: &SelectStmt, sql: &str, dialect: Dialect) -> Vec<Diagnostic> {
    let ctx = LintContext { sql, dialect };
    let mut diagnostics = Vec::new();
    for rule in rules_for(dialect) {
        diagnostics.extend(rule.check(stmt, &ctx));
    }
    diagnostics.sort_by_key(|d| (d.position, d.severity));
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse_select;

    fn lint(sql: &str, dialect: Dialect) -> Vec<Diagnostic> {
        let stmt = parse_select(sql, dialect).unwrap().unwrap();
        run_rules(&stmt, sql, dialect)
    }

    #[test]
    fn registry_scopes_portability_rules_by_dialect() {
        let generic: Vec<_> = rules_for(Dialect::Generic)
            .iter()
            .map(|r| r.id())
            .collect();
        assert!(generic.contains(&"P001"));
        assert!(generic.contains(&"P002"));

        let postgres: Vec<_> = rules_for(Dialect::Postgres)
            .iter()
            .map(|r| r.id())
            .collect();
        assert!(!postgres.contains(&"P001"));
        assert!(!postgres.contains(&"P002"));
    }

    #[test]
    fn clean_statement_produces_no_diagnostics() {
        let diagnostics = lint("SELECT id FROM users u WHERE u.active", Dialect::Postgres);
        assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");
    }

    #[test]
    fn diagnostics_are_position_ordered() {
        let diagnostics = lint("select id, u.name from users u;", Dialect::Postgres);
        let positions: Vec<_> = diagnostics.iter().map(|d| d.position).collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
    }
}
