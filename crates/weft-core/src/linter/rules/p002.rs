//! P002: `ILIKE` is not portable.

use super::rule_url;
use crate::linter::{mask_quoted, LintContext, LintRule};
use crate::sql::SelectStmt;
use crate::types::{position_at, Diagnostic};
use regex::Regex;
use std::sync::OnceLock;

fn ilike_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bilike\b").expect("valid regex"))
}

pub struct PortableIlike;

impl LintRule for PortableIlike {
    fn id(&self) -> &'static str {
        "P002"
    }

    fn name(&self) -> &'static str {
        "portable-ilike"
    }

    fn description(&self) -> &'static str {
        "`ILIKE` only exists on postgres-family dialects; use LOWER(...) LIKE LOWER(...)"
    }

    fn check(&self, _stmt: &SelectStmt, ctx: &LintContext) -> Vec<Diagnostic> {
        let masked = mask_quoted(ctx.sql);
        ilike_regex()
            .find_iter(&masked)
            .map(|m| {
                Diagnostic::warning(
                    self.id(),
                    format!(
                        "`ILIKE` is not available on the `{}` dialect; \
                         use LOWER(...) LIKE LOWER(...)",
                        ctx.dialect
                    ),
                )
                .at(position_at(ctx.sql, m.start()))
                .with_end(position_at(ctx.sql, m.end()))
                .with_url(rule_url(self.id()))
            })
            .collect()
    }
}
