//! Diagnostic assembly and version-ordered publication state.
//!
//! File-level diagnostics come from the parse phases (`E001`–`E003`),
//! the statement linter, and macro resolution (`E101`/`E102`).
//! Project-level diagnostics are merged in by the backend so each URI
//! gets exactly one publication per version, monotone in version.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tower_lsp::lsp_types as lsp;
use weft_core::linter::run_rules;
use weft_core::macros::MacroNamespace;
use weft_core::template::TemplateNode;
use weft_core::text::suggestions;
use weft_core::types::{codes, Diagnostic, Position, Severity};
use weft_engine::provider::ParsedDocument;

/// Computes every file-level diagnostic for a parsed document.
pub fn file_diagnostics(
    document: &ParsedDocument,
    namespaces: &[MacroNamespace],
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for error in &document.frontmatter.errors {
        let position = match error {
            weft_core::frontmatter::FrontmatterError::Parse { line, .. } => {
                Position::new(*line, 1)
            }
            _ => Position::start(),
        };
        diagnostics.push(
            Diagnostic::error(codes::FRONTMATTER, error.to_string()).at(position),
        );
    }

    for error in &document.template_errors {
        diagnostics
            .push(Diagnostic::error(codes::TEMPLATE, error.to_string()).at(error.position()));
    }

    if let Some(error) = &document.sql_error {
        diagnostics.push(
            Diagnostic::error(codes::SQL_PARSE, error.message.clone())
                .at(error.position.unwrap_or_else(Position::start)),
        );
    }

    if let Some(stmt) = &document.select {
        diagnostics.extend(run_rules(stmt, &document.placeholder_sql, document.dialect));
    }

    check_macro_references(&document.template, namespaces, &mut diagnostics);
    diagnostics
}

fn call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_]\w*)\.([A-Za-z_]\w*)\s*\(").expect("valid regex")
    })
}

/// Checks `{{ ns.fn(...) }}` expressions against the macro index.
fn check_macro_references(
    nodes: &[TemplateNode],
    namespaces: &[MacroNamespace],
    diagnostics: &mut Vec<Diagnostic>,
) {
    for node in nodes {
        match node {
            TemplateNode::Expr { source, position } => {
                let Some(caps) = call_regex().captures(source) else {
                    continue;
                };
                let namespace = &caps[1];
                let function = &caps[2];
                if crate::builtins::find_global(namespace).is_some() {
                    continue;
                }
                let Some(ns) = namespaces.iter().find(|ns| ns.name == namespace) else {
                    let known: Vec<&str> = namespaces.iter().map(|ns| ns.name.as_str()).collect();
                    let mut message = format!("unknown macro namespace `{namespace}`");
                    let close = suggestions(namespace, known.into_iter(), 2);
                    if let Some(best) = close.first() {
                        message.push_str(&format!("; did you mean `{best}`?"));
                    }
                    diagnostics.push(
                        Diagnostic::error(codes::UNKNOWN_NAMESPACE, message).at(*position),
                    );
                    continue;
                };
                if !ns.functions.iter().any(|f| f.name == function) {
                    let known = ns.functions.iter().map(|f| f.name.as_str());
                    let mut message =
                        format!("namespace `{namespace}` has no function `{function}`");
                    let close = suggestions(function, known, 2);
                    if let Some(best) = close.first() {
                        message.push_str(&format!("; did you mean `{namespace}.{best}`?"));
                    }
                    diagnostics.push(
                        Diagnostic::error(codes::UNKNOWN_FUNCTION, message).at(*position),
                    );
                }
            }
            TemplateNode::For { body, .. } => {
                check_macro_references(body, namespaces, diagnostics);
            }
            TemplateNode::If {
                body,
                elifs,
                else_body,
                ..
            } => {
                check_macro_references(body, namespaces, diagnostics);
                for branch in elifs {
                    check_macro_references(&branch.body, namespaces, diagnostics);
                }
                if let Some(else_nodes) = else_body {
                    check_macro_references(else_nodes, namespaces, diagnostics);
                }
            }
            TemplateNode::Text { .. } => {}
        }
    }
}

/// Converts an internal diagnostic (1-based) to the editor shape
/// (0-based).
pub fn to_lsp_diagnostic(diagnostic: &Diagnostic) -> lsp::Diagnostic {
    let start = to_lsp_position(diagnostic.position);
    let end = diagnostic
        .end_position
        .map(to_lsp_position)
        .unwrap_or(start);
    lsp::Diagnostic {
        range: lsp::Range { start, end },
        severity: Some(match diagnostic.severity {
            Severity::Error => lsp::DiagnosticSeverity::ERROR,
            Severity::Warning => lsp::DiagnosticSeverity::WARNING,
            Severity::Info => lsp::DiagnosticSeverity::INFORMATION,
            Severity::Hint => lsp::DiagnosticSeverity::HINT,
        }),
        code: Some(lsp::NumberOrString::String(diagnostic.rule_id.clone())),
        code_description: None,
        source: Some("weft".to_string()),
        message: diagnostic.message.clone(),
        related_information: None,
        tags: None,
        data: None,
    }
}

fn to_lsp_position(position: Position) -> lsp::Position {
    lsp::Position {
        line: position.line.saturating_sub(1),
        character: position.column.saturating_sub(1),
    }
}

/// Per-URI publication guard: a publication goes out only when its
/// version is not older than the last published one, so a stale
/// recompute can never overwrite a newer publication.
#[derive(Debug, Default)]
pub struct PublishGuard {
    last_published: HashMap<String, i32>,
}

impl PublishGuard {
    /// Records and approves `version` unless a newer one already went
    /// out.
    pub fn admit(&mut self, uri: &str, version: i32) -> bool {
        match self.last_published.get(uri) {
            Some(last) if *last > version => false,
            _ => {
                self.last_published.insert(uri.to_string(), version);
                true
            }
        }
    }

    pub fn forget(&mut self, uri: &str) {
        self.last_published.remove(uri);
    }
}
