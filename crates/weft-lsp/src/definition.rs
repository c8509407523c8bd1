//! Go-to-definition for macro references.

use crate::document::Document;
use crate::hover::qualified_at;
use weft_core::macros::MacroNamespace;

/// A resolved definition target: the macro script file and the
/// 0-based line of the function's `def`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionTarget {
    pub file_path: String,
    pub line: u32,
}

/// Resolves `ns.fn` at `offset` to its definition.
pub fn definition_at(
    document: &Document,
    offset: usize,
    namespaces: &[MacroNamespace],
) -> Option<DefinitionTarget> {
    let (namespace, function) = qualified_at(document, offset)?;
    let ns = namespaces.iter().find(|ns| ns.name == namespace)?;
    let f = ns.functions.iter().find(|f| f.name == function)?;
    Some(DefinitionTarget {
        file_path: ns.file_path.clone(),
        line: f.line.saturating_sub(1),
    })
}
