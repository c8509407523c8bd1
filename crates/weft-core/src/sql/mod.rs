//! Dialect-aware SQL parsing.
//!
//! Parsing happens in two steps: `sqlparser` with the dialect's parser
//! produces the vendor AST, and [`lower`] turns the first statement
//! into the owned [`SelectStmt`] tree. Parse failures map to
//! [`SqlError`] (diagnostic code `E003`) with the position recovered
//! from the parser's error message when present.

pub mod ast;
mod lower;

pub use ast::*;

use crate::dialect::Dialect;
use crate::types::Position;
use regex::Regex;
use sqlparser::parser::Parser;
use std::fmt;
use std::sync::OnceLock;

/// A SQL parse (or lowering) failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlError {
    pub message: String,
    pub position: Option<Position>,
}

impl SqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }

    /// Recovers "Line: X, Column: Y" from a `sqlparser` error message.
    fn position_from_message(message: &str) -> Option<Position> {
        static POSITION_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = POSITION_REGEX.get_or_init(|| {
            Regex::new(r"Line:\s*(\d+)\s*,\s*Column:\s*(\d+)").expect("valid regex")
        });
        let caps = re.captures(message)?;
        let line: u32 = caps.get(1)?.as_str().parse().ok()?;
        let column: u32 = caps.get(2)?.as_str().parse().ok()?;
        Some(Position::new(line, column))
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "SQL error at {pos}: {}", self.message),
            None => write!(f, "SQL error: {}", self.message),
        }
    }
}

impl std::error::Error for SqlError {}

impl From<sqlparser::parser::ParserError> for SqlError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        let message = err.to_string();
        let position = Self::position_from_message(&message);
        Self { message, position }
    }
}

/// Parses a model body (after placeholder substitution) into a
/// [`SelectStmt`].
///
/// Returns `Ok(None)` when the input contains no statements (empty
/// files and comment-only files are not errors). A non-SELECT first
/// statement is an error: model files materialize a single SELECT.
pub fn parse_select(sql: &str, dialect: Dialect) -> Result<Option<SelectStmt>, SqlError> {
    let statements = Parser::parse_sql(dialect.to_sqlparser().as_ref(), sql)?;
    let Some(statement) = statements.into_iter().next() else {
        return Ok(None);
    };
    match statement {
        sqlparser::ast::Statement::Query(query) => lower::lower_query(&query).map(Some),
        other => Err(SqlError::new(format!(
            "model files must contain a single SELECT statement, found `{}`",
            statement_kind(&other)
        ))),
    }
}

fn statement_kind(statement: &sqlparser::ast::Statement) -> String {
    let rendered = statement.to_string();
    rendered
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_string()
}
