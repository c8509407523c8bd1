//! L001: SQL keywords should be uppercase.

use super::rule_url;
use crate::linter::{mask_quoted, LintContext, LintRule};
use crate::sql::SelectStmt;
use crate::types::{position_at, Diagnostic, Fix, Span, TextEdit};
use regex::Regex;
use std::sync::OnceLock;

fn keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Lowercase-only pattern: mixed or upper case does not match.
        Regex::new(
            r"\b(select|from|where|join|left|right|full|inner|outer|cross|on|group|by|order|having|union|intersect|except|with|as|case|when|then|else|end|and|or|not|null|is|in|exists|distinct|limit|offset|asc|desc|like|between)\b",
        )
        .expect("valid regex")
    })
}

pub struct KeywordCase;

impl LintRule for KeywordCase {
    fn id(&self) -> &'static str {
        "L001"
    }

    fn name(&self) -> &'static str {
        "keyword-case"
    }

    fn description(&self) -> &'static str {
        "SQL keywords should be written in uppercase"
    }

    fn check(&self, _stmt: &SelectStmt, ctx: &LintContext) -> Vec<Diagnostic> {
        let masked = mask_quoted(ctx.sql);
        keyword_regex()
            .find_iter(&masked)
            .map(|m| {
                let keyword = m.as_str();
                let span = Span::new(m.start(), m.end());
                Diagnostic::warning(
                    self.id(),
                    format!("keyword `{keyword}` should be uppercase"),
                )
                .at(position_at(ctx.sql, m.start()))
                .with_end(position_at(ctx.sql, m.end()))
                .with_url(rule_url(self.id()))
                .with_fix(Fix::new(
                    format!("Replace with `{}`", keyword.to_uppercase()),
                    vec![TextEdit::replace(span, keyword.to_uppercase())],
                ))
            })
            .collect()
    }
}
