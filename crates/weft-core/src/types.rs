//! Shared diagnostic and position types.
//!
//! Two coordinate systems coexist in weft. Parser-facing code uses
//! 1-based [`Position`] values (line/column), matching what `sqlparser`
//! and the template lexer report. Fix machinery uses byte-offset
//! [`Span`]s into the source text, which is what text edits are applied
//! against. The LSP layer converts both to 0-based editor positions at
//! the protocol boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based line/column position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The first position of a document.
    pub fn start() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open byte range `[start, end)` into source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Diagnostic severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

/// A single replacement of a byte range with new text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub new_text: String,
}

impl TextEdit {
    pub fn replace(span: Span, new_text: impl Into<String>) -> Self {
        Self {
            start: span.start,
            end: span.end,
            new_text: new_text.into(),
        }
    }

    pub fn delete(span: Span) -> Self {
        Self::replace(span, "")
    }
}

/// A named alternative offered as a code action: an ordered list of edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    pub title: String,
    pub edits: Vec<TextEdit>,
}

impl Fix {
    pub fn new(title: impl Into<String>, edits: Vec<TextEdit>) -> Self {
        Self {
            title: title.into(),
            edits,
        }
    }
}

/// A diagnostic produced by any analysis phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Machine-readable rule or phase code (e.g. "E003", "L001").
    pub rule_id: String,
    pub severity: Severity,
    /// 1-based start position.
    pub position: Position,
    /// 1-based end position, when a range is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_position: Option<Position>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixes: Vec<Fix>,
}

impl Diagnostic {
    pub fn error(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule_id, Severity::Error, message)
    }

    pub fn warning(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule_id, Severity::Warning, message)
    }

    pub fn info(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(rule_id, Severity::Info, message)
    }

    fn new(rule_id: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            position: Position::start(),
            end_position: None,
            message: message.into(),
            documentation_url: None,
            fixes: Vec::new(),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_end(mut self, end: Position) -> Self {
        self.end_position = Some(end);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.documentation_url = Some(url.into());
        self
    }

    pub fn with_fix(mut self, fix: Fix) -> Self {
        self.fixes.push(fix);
        self
    }
}

/// Diagnostic codes for the parse phases and macro resolution.
pub mod codes {
    /// Front-matter YAML error or unknown header field.
    pub const FRONTMATTER: &str = "E001";
    /// Template lex/parse error or unmatched block.
    pub const TEMPLATE: &str = "E002";
    /// SQL parse error.
    pub const SQL_PARSE: &str = "E003";
    /// Unknown macro namespace.
    pub const UNKNOWN_NAMESPACE: &str = "E101";
    /// Unknown macro function within a known namespace.
    pub const UNKNOWN_FUNCTION: &str = "E102";
}

/// Computes the 1-based position of a byte offset within `text`.
///
/// Offsets past the end of the text clamp to the final position.
pub fn position_at(text: &str, offset: usize) -> Position {
    let offset = offset.min(text.len());
    let mut line = 1u32;
    let mut line_start = 0usize;
    for (idx, byte) in text.as_bytes().iter().enumerate() {
        if idx >= offset {
            break;
        }
        if *byte == b'\n' {
            line += 1;
            line_start = idx + 1;
        }
    }
    Position::new(line, (offset - line_start) as u32 + 1)
}
