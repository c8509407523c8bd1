//! Template layer for model bodies.
//!
//! The body of a model file mixes literal SQL text with two delimiter
//! families: `{{ … }}` carries an expression (kept as an opaque string
//! for the script evaluator) and `{* … *}` carries control flow
//! (`for x in <expr>:`, `if <expr>:`, `elif <expr>:`, `else:`,
//! `endfor`, `endif`).
//!
//! Template processing runs before SQL parsing:
//!
//! ```text
//! body → [lexer] → tokens → [parser] → node tree
//!                        → [placeholder] → SQL the parser accepts
//! ```
//!
//! For SQL analysis the template is *not* evaluated. Instead
//! [`to_placeholder_sql`] substitutes every expression with the fixed
//! [`EXPR_PLACEHOLDER`] token and elides control tags while preserving
//! their newlines, so line numbers survive into SQL diagnostics.

mod lexer;
mod parser;

pub use lexer::{lex, BlockTag, Token, TokenKind};
pub use parser::{parse, ElifBranch, TemplateNode};

use crate::types::Position;
use thiserror::Error;

/// Placeholder substituted for `{{ … }}` expressions in the SQL phase.
pub const EXPR_PLACEHOLDER: &str = "__EXPR__";

/// Error raised by the template lexer or parser.
///
/// All template errors are recoverable: the SQL phase still runs on the
/// placeholder-substituted body. They surface as `E002` diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed expression delimiter `{{{{` at {position}")]
    UnclosedExpr { position: Position },
    #[error("unclosed block delimiter `{{*` at {position}")]
    UnclosedBlock { position: Position },
    #[error("malformed block tag `{tag}` at {position}")]
    BadTag { tag: String, position: Position },
    #[error("unmatched `{kind}` at {position}")]
    UnmatchedBlock { kind: String, position: Position },
}

impl TemplateError {
    pub fn position(&self) -> Position {
        match self {
            TemplateError::UnclosedExpr { position }
            | TemplateError::UnclosedBlock { position }
            | TemplateError::BadTag { position, .. }
            | TemplateError::UnmatchedBlock { position, .. } => *position,
        }
    }
}

/// Substitutes template delimiters so the body parses as plain SQL.
///
/// Every expression becomes [`EXPR_PLACEHOLDER`]; control tags are
/// elided. Newlines inside delimited regions are re-emitted so later
/// lines keep their numbers. Lex errors do not stop substitution: the
/// recovered token stream is substituted as-is.
pub fn to_placeholder_sql(body: &str) -> String {
    let (tokens, _) = lex(body);
    let mut out = String::with_capacity(body.len());
    for token in &tokens {
        let raw = &body[token.span.start..token.span.end];
        match &token.kind {
            TokenKind::Text => out.push_str(raw),
            TokenKind::Expr(_) => {
                out.push_str(EXPR_PLACEHOLDER);
                push_newlines(&mut out, raw);
            }
            TokenKind::Block(_) => push_newlines(&mut out, raw),
        }
    }
    out
}

fn push_newlines(out: &mut String, raw: &str) {
    for _ in raw.matches('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_substitutes_expressions() {
        let sql = to_placeholder_sql("SELECT {{ col }} FROM users");
        assert_eq!(sql, "SELECT __EXPR__ FROM users");
    }

    #[test]
    fn placeholder_elides_blocks_but_keeps_newlines() {
        let body = "SELECT 1\n{* if flag: *}\n, 2\n{* endif *}\nFROM t";
        let sql = to_placeholder_sql(body);
        assert_eq!(sql.matches('\n').count(), body.matches('\n').count());
        assert!(!sql.contains("if flag"));
        assert!(sql.contains("FROM t"));
    }

    #[test]
    fn placeholder_is_idempotent_on_plain_sql() {
        let sql = "SELECT a, b FROM t WHERE a > 1";
        let once = to_placeholder_sql(sql);
        assert_eq!(once, sql);
        assert_eq!(to_placeholder_sql(&once), once);
    }

    #[test]
    fn placeholder_survives_unclosed_expression() {
        let sql = to_placeholder_sql("SELECT {{ col FROM users");
        assert!(sql.starts_with("SELECT __EXPR__"));
    }
}
