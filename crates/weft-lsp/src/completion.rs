//! Completion context detection and item construction.
//!
//! Contexts, detected from the text before the cursor:
//!
//! - inside `{{ … }}` at the root → builtin globals + macro namespaces
//! - after `{{ ns.` → functions of that namespace, filtered by the
//!   typed prefix
//! - after `{{ config.` → known configuration keys
//! - after SQL `SELECT` / `WHERE` / `HAVING` / `ON` → SQL functions
//! - after `FROM` / `JOIN` → known model paths

use crate::builtins::{CONFIG_KEYS, GLOBALS, SQL_FUNCTIONS};
use regex::Regex;
use std::sync::OnceLock;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, InsertTextFormat, MarkupContent,
    MarkupKind,
};
use weft_core::macros::MacroNamespace;

/// Where the cursor sits, for completion purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionContext {
    /// Root of a template expression; `partial` is the typed word.
    ExprRoot { partial: String },
    /// After `ns.` inside an expression.
    NamespaceMember { namespace: String, partial: String },
    /// After `config.` inside an expression.
    ConfigKey { partial: String },
    /// SQL scalar position.
    SqlFunctions,
    /// After FROM/JOIN.
    ModelRef { partial: String },
    None,
}

fn member_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_]\w*)\.(\w*)$").expect("valid regex"))
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_]\w*)$").expect("valid regex"))
}

fn from_join_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(from|join)\s+([\w.]*)$").expect("valid regex"))
}

fn scalar_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(select|where|having|on|when|then|and|or|by)\b").expect("valid regex")
    })
}

/// Detects the completion context from everything before the cursor.
pub fn detect_context(before: &str) -> CompletionContext {
    // Inside an unclosed `{{ … }}`?
    let open = before.rfind("{{");
    let close = before.rfind("}}");
    let inside_expr = match (open, close) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    };

    if inside_expr {
        let expr = &before[open.unwrap_or(0) + 2..];
        if let Some(caps) = member_regex().captures(expr) {
            let qualifier = caps[1].to_string();
            let partial = caps[2].to_string();
            if qualifier == "config" {
                return CompletionContext::ConfigKey { partial };
            }
            return CompletionContext::NamespaceMember {
                namespace: qualifier,
                partial,
            };
        }
        let partial = word_regex()
            .captures(expr)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        return CompletionContext::ExprRoot { partial };
    }

    if let Some(caps) = from_join_regex().captures(before) {
        return CompletionContext::ModelRef {
            partial: caps[2].to_string(),
        };
    }

    if scalar_keyword_regex().is_match(before) {
        return CompletionContext::SqlFunctions;
    }

    CompletionContext::None
}

/// Builds the completion items for a detected context.
pub fn items_for(
    context: &CompletionContext,
    namespaces: &[MacroNamespace],
    model_paths: &[String],
) -> Vec<CompletionItem> {
    match context {
        CompletionContext::ExprRoot { partial } => {
            let mut items: Vec<CompletionItem> = GLOBALS
                .iter()
                .filter(|g| g.name.starts_with(partial.as_str()))
                .map(|g| CompletionItem {
                    label: g.name.to_string(),
                    kind: Some(CompletionItemKind::VARIABLE),
                    detail: Some(g.detail.to_string()),
                    documentation: Some(markdown(g.doc)),
                    ..Default::default()
                })
                .collect();
            items.extend(
                namespaces
                    .iter()
                    .filter(|ns| ns.name.starts_with(partial.as_str()))
                    .map(|ns| CompletionItem {
                        label: ns.name.clone(),
                        kind: Some(CompletionItemKind::MODULE),
                        detail: Some(format!("macro namespace ({})", ns.file_path)),
                        ..Default::default()
                    }),
            );
            items
        }
        CompletionContext::NamespaceMember { namespace, partial } => namespaces
            .iter()
            .filter(|ns| &ns.name == namespace)
            .flat_map(|ns| ns.functions.iter())
            .filter(|f| f.name.starts_with(partial.as_str()))
            .map(|f| {
                let args = f
                    .args
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| format!("${{{}:{}}}", i + 1, arg))
                    .collect::<Vec<_>>()
                    .join(", ");
                CompletionItem {
                    label: f.name.clone(),
                    kind: Some(CompletionItemKind::FUNCTION),
                    detail: Some(format!("{}({})", f.name, f.args.join(", "))),
                    documentation: f.docstring.as_deref().map(markdown),
                    insert_text: Some(format!("{}({})", f.name, args)),
                    insert_text_format: Some(InsertTextFormat::SNIPPET),
                    ..Default::default()
                }
            })
            .collect(),
        CompletionContext::ConfigKey { partial } => CONFIG_KEYS
            .iter()
            .filter(|(key, _)| key.starts_with(partial.as_str()))
            .map(|(key, doc)| CompletionItem {
                label: key.to_string(),
                kind: Some(CompletionItemKind::PROPERTY),
                detail: Some(doc.to_string()),
                ..Default::default()
            })
            .collect(),
        CompletionContext::SqlFunctions => SQL_FUNCTIONS
            .iter()
            .map(|f| CompletionItem {
                label: f.name.to_string(),
                kind: Some(CompletionItemKind::FUNCTION),
                detail: Some(f.signature.to_string()),
                documentation: Some(markdown(f.doc)),
                ..Default::default()
            })
            .collect(),
        CompletionContext::ModelRef { partial } => model_paths
            .iter()
            .filter(|path| path.starts_with(partial.as_str()))
            .map(|path| CompletionItem {
                label: path.clone(),
                kind: Some(CompletionItemKind::CLASS),
                detail: Some("model".to_string()),
                ..Default::default()
            })
            .collect(),
        CompletionContext::None => Vec::new(),
    }
}

fn markdown(text: &str) -> Documentation {
    Documentation::MarkupContent(MarkupContent {
        kind: MarkupKind::Markdown,
        value: text.to_string(),
    })
}
