//! Hover resolution.

use crate::builtins::{find_global, find_sql_function};
use crate::document::Document;
use weft_core::macros::MacroNamespace;

/// Resolves hover content (markdown) for the word at `offset`.
pub fn hover_markdown(
    document: &Document,
    offset: usize,
    namespaces: &[MacroNamespace],
) -> Option<String> {
    let word = document.word_at(offset)?;

    // `ns.word`: a macro function reference?
    if let Some((namespace, function)) = qualified_at(document, offset) {
        if let Some(ns) = namespaces.iter().find(|ns| ns.name == namespace) {
            if let Some(f) = ns.functions.iter().find(|f| f.name == function) {
                let mut text = format!(
                    "**{}.{}({})**",
                    ns.name,
                    f.name,
                    f.args.join(", ")
                );
                if let Some(doc) = &f.docstring {
                    text.push_str("\n\n");
                    text.push_str(doc);
                }
                text.push_str(&format!("\n\n*defined in {}*", ns.file_path));
                return Some(text);
            }
        }
    }

    if let Some(global) = find_global(word) {
        return Some(format!("**{}** — {}\n\n{}", global.name, global.detail, global.doc));
    }

    if let Some(function) = find_sql_function(word) {
        let mut text = format!("**{}**\n\n{}", function.signature, function.doc);
        if function.aggregate {
            text.push_str("\n\n*aggregate function*");
        }
        if function.window {
            text.push_str("\n\n*window function*");
        }
        return Some(text);
    }

    None
}

/// If the word at `offset` is the member of a dotted pair, returns
/// `(qualifier, member)`.
pub fn qualified_at(document: &Document, offset: usize) -> Option<(String, String)> {
    let word = document.word_at(offset)?;
    let bytes = document.content.as_bytes();
    let mut start = offset.min(bytes.len());
    while start > 0 && (bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_') {
        start -= 1;
    }
    if start == 0 || bytes[start - 1] != b'.' {
        return None;
    }
    let qualifier = document.word_at(start.checked_sub(2)?)?;
    Some((qualifier.to_string(), word.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::macros::MacroFunction;

    fn namespaces() -> Vec<MacroNamespace> {
        vec![MacroNamespace {
            name: "helpers".into(),
            file_path: "macros/helpers.py".into(),
            package: None,
            functions: vec![MacroFunction {
                name: "full_name".into(),
                args: vec!["first".into(), "last".into()],
                docstring: Some("Joins a first and last name.".into()),
                line: 3,
            }],
        }]
    }

    #[test]
    fn hovers_macro_functions_with_docstring() {
        let doc = Document::new("SELECT {{ helpers.full_name(a, b) }}", 1);
        let offset = doc.content.find("full_name").unwrap() + 2;
        let text = hover_markdown(&doc, offset, &namespaces()).unwrap();
        assert!(text.contains("helpers.full_name(first, last)"));
        assert!(text.contains("Joins a first and last name."));
        assert!(text.contains("macros/helpers.py"));
    }

    #[test]
    fn hovers_builtin_globals() {
        let doc = Document::new("SELECT {{ this.name }}", 1);
        let offset = doc.content.find("this").unwrap() + 1;
        let text = hover_markdown(&doc, offset, &[]).unwrap();
        assert!(text.contains("**this**"));
    }

    #[test]
    fn hovers_sql_functions_with_flags() {
        let doc = Document::new("SELECT SUM(amount) FROM t", 1);
        let offset = doc.content.find("SUM").unwrap() + 1;
        let text = hover_markdown(&doc, offset, &[]).unwrap();
        assert!(text.contains("sum(expr)"));
        assert!(text.contains("aggregate function"));

        let doc = Document::new("SELECT row_number() OVER ()", 1);
        let offset = doc.content.find("row_number").unwrap();
        let text = hover_markdown(&doc, offset, &[]).unwrap();
        assert!(text.contains("window function"));
    }

    #[test]
    fn plain_identifiers_have_no_hover() {
        let doc = Document::new("SELECT some_col FROM t", 1);
        let offset = doc.content.find("some_col").unwrap();
        assert!(hover_markdown(&doc, offset, &[]).is_none());
    }

    #[test]
    fn qualified_pair_extraction() {
        let doc = Document::new("{{ helpers.full_name() }}", 1);
        let offset = doc.content.find("full_name").unwrap();
        assert_eq!(
            qualified_at(&doc, offset),
            Some(("helpers".into(), "full_name".into()))
        );
        let offset = doc.content.find("helpers").unwrap();
        assert_eq!(qualified_at(&doc, offset), None);
    }
}
