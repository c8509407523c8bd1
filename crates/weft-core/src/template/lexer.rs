//! Template lexer.
//!
//! Splits a model body into text, expression and control-tag tokens.
//! Token spans partition the input: the sum of span lengths equals the
//! input length, which is what keeps placeholder substitution and
//! position math honest.

use super::TemplateError;
use crate::types::{Position, Span};

/// A lexed region of the template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range of the whole region, delimiters included.
    pub span: Span,
    /// 1-based position of the region start.
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal text, passed through verbatim.
    Text,
    /// `{{ … }}` with the trimmed inner expression source.
    Expr(String),
    /// `{* … *}` control tag.
    Block(BlockTag),
}

/// A parsed `{* … *}` control tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockTag {
    For { var: String, iter: String },
    If(String),
    Elif(String),
    Else,
    EndFor,
    EndIf,
}

impl BlockTag {
    pub fn kind(&self) -> &'static str {
        match self {
            BlockTag::For { .. } => "for",
            BlockTag::If(_) => "if",
            BlockTag::Elif(_) => "elif",
            BlockTag::Else => "else",
            BlockTag::EndFor => "endfor",
            BlockTag::EndIf => "endif",
        }
    }
}

/// Lexes a template body. Errors are recoverable: an unclosed delimiter
/// consumes the rest of the input as its content, and a malformed tag
/// degrades to a text token, so the token stream always covers the
/// whole input.
pub fn lex(body: &str) -> (Vec<Token>, Vec<TemplateError>) {
    Lexer::new(body).run()
}

struct Lexer<'a> {
    body: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    line_start: usize,
    tokens: Vec<Token>,
    errors: Vec<TemplateError>,
}

impl<'a> Lexer<'a> {
    fn new(body: &'a str) -> Self {
        Self {
            body,
            bytes: body.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> (Vec<Token>, Vec<TemplateError>) {
        let mut text_start = 0usize;
        while self.pos < self.bytes.len() {
            if self.starts_with("{{") {
                self.flush_text(text_start, self.pos);
                self.lex_expr();
                text_start = self.pos;
            } else if self.starts_with("{*") {
                self.flush_text(text_start, self.pos);
                self.lex_block();
                text_start = self.pos;
            } else {
                self.advance();
            }
        }
        self.flush_text(text_start, self.pos);
        (self.tokens, self.errors)
    }

    fn starts_with(&self, s: &str) -> bool {
        // Byte-wise so scanning never lands inside a UTF-8 sequence.
        self.bytes[self.pos..].starts_with(s.as_bytes())
    }

    fn position(&self) -> Position {
        Position::new(self.line, (self.pos - self.line_start) as u32 + 1)
    }

    fn advance(&mut self) {
        if self.bytes[self.pos] == b'\n' {
            self.line += 1;
            self.line_start = self.pos + 1;
        }
        self.pos += 1;
    }

    fn advance_to(&mut self, target: usize) {
        while self.pos < target {
            self.advance();
        }
    }

    fn flush_text(&mut self, start: usize, end: usize) {
        if end > start {
            self.tokens.push(Token {
                kind: TokenKind::Text,
                span: Span::new(start, end),
                position: position_of(self.body, start),
            });
        }
    }

    /// Lexes `{{ … }}`, tracking nested braces so dict/set literals in
    /// the expression do not close the delimiter prematurely.
    fn lex_expr(&mut self) {
        let start = self.pos;
        let position = self.position();
        let mut i = start + 2;
        let mut depth = 0usize;
        let mut close = None;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'{' => depth += 1,
                b'}' => {
                    if depth > 0 {
                        depth -= 1;
                    } else if self.bytes.get(i + 1) == Some(&b'}') {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        let (inner_end, region_end) = match close {
            Some(idx) => (idx, idx + 2),
            None => {
                self.errors.push(TemplateError::UnclosedExpr { position });
                (self.bytes.len(), self.bytes.len())
            }
        };
        let inner = self.body[start + 2..inner_end].trim().to_string();
        self.tokens.push(Token {
            kind: TokenKind::Expr(inner),
            span: Span::new(start, region_end),
            position,
        });
        self.advance_to(region_end);
    }

    fn lex_block(&mut self) {
        let start = self.pos;
        let position = self.position();
        let (inner_end, region_end) = match self.body[start + 2..].find("*}") {
            Some(rel) => (start + 2 + rel, start + 2 + rel + 2),
            None => {
                self.errors.push(TemplateError::UnclosedBlock { position });
                (self.bytes.len(), self.bytes.len())
            }
        };
        let inner = self.body[start + 2..inner_end].trim();
        match parse_tag(inner) {
            Some(tag) => self.tokens.push(Token {
                kind: TokenKind::Block(tag),
                span: Span::new(start, region_end),
                position,
            }),
            None => {
                self.errors.push(TemplateError::BadTag {
                    tag: inner.to_string(),
                    position,
                });
                self.tokens.push(Token {
                    kind: TokenKind::Text,
                    span: Span::new(start, region_end),
                    position,
                });
            }
        }
        self.advance_to(region_end);
    }
}

fn position_of(body: &str, offset: usize) -> Position {
    crate::types::position_at(body, offset)
}

fn parse_tag(inner: &str) -> Option<BlockTag> {
    if inner == "endfor" {
        return Some(BlockTag::EndFor);
    }
    if inner == "endif" {
        return Some(BlockTag::EndIf);
    }
    if inner == "else:" || inner == "else" {
        return Some(BlockTag::Else);
    }
    if let Some(rest) = inner.strip_prefix("for ") {
        let rest = rest.strip_suffix(':')?;
        let (var, iter) = rest.split_once(" in ")?;
        let var = var.trim();
        let iter = iter.trim();
        if var.is_empty() || iter.is_empty() || !is_identifier(var) {
            return None;
        }
        return Some(BlockTag::For {
            var: var.to_string(),
            iter: iter.to_string(),
        });
    }
    if let Some(rest) = inner.strip_prefix("if ") {
        let cond = rest.strip_suffix(':')?.trim();
        if cond.is_empty() {
            return None;
        }
        return Some(BlockTag::If(cond.to_string()));
    }
    if let Some(rest) = inner.strip_prefix("elif ") {
        let cond = rest.strip_suffix(':')?.trim();
        if cond.is_empty() {
            return None;
        }
        return Some(BlockTag::Elif(cond.to_string()));
    }
    None
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(body: &str) -> Vec<TokenKind> {
        lex(body).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_text_and_expression() {
        let kinds = kinds("SELECT {{ col }} FROM t");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Text,
                TokenKind::Expr("col".into()),
                TokenKind::Text,
            ]
        );
    }

    #[test]
    fn nested_braces_do_not_close_expression() {
        let (tokens, errors) = lex("{{ {'a': {'b': 1}} }} tail");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Expr("{'a': {'b': 1}}".into()));
        assert_eq!(tokens[1].kind, TokenKind::Text);
    }

    #[test]
    fn lexes_control_tags() {
        let (tokens, errors) = lex("{* for x in items: *}{{ x }}{* endfor *}");
        assert!(errors.is_empty());
        assert_eq!(
            tokens[0].kind,
            TokenKind::Block(BlockTag::For {
                var: "x".into(),
                iter: "items".into()
            })
        );
        assert_eq!(tokens[2].kind, TokenKind::Block(BlockTag::EndFor));
    }

    #[test]
    fn unclosed_expression_recovers_to_eof() {
        let (tokens, errors) = lex("SELECT {{ col");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TemplateError::UnclosedExpr { .. }));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Expr("col".into()));
    }

    #[test]
    fn malformed_tag_degrades_to_text() {
        let (tokens, errors) = lex("{* loop x *}");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TemplateError::BadTag { .. }));
        assert_eq!(tokens[0].kind, TokenKind::Text);
    }

    #[test]
    fn positions_are_one_based() {
        let (tokens, _) = lex("a\n{{ x }}");
        assert_eq!(tokens[1].position, Position::new(2, 1));
    }

    #[test]
    fn non_ascii_text_lexes_cleanly() {
        let body = "SELECT 'café' AS c, {{ città }} FROM t";
        let (tokens, errors) = lex(body);
        assert!(errors.is_empty());
        assert!(tokens
            .iter()
            .any(|t| matches!(&t.kind, TokenKind::Expr(e) if e == "città")));
        let total: usize = tokens.iter().map(|t| t.span.len()).sum();
        assert_eq!(total, body.len());
    }

    #[test]
    fn spans_partition_the_input() {
        let body = "x {{ a }} y {* if c: *} z {* endif *}";
        let (tokens, _) = lex(body);
        let total: usize = tokens.iter().map(|t| t.span.len()).sum();
        assert_eq!(total, body.len());
        let mut cursor = 0;
        for token in &tokens {
            assert_eq!(token.span.start, cursor);
            cursor = token.span.end;
        }
        assert_eq!(cursor, body.len());
    }
}
