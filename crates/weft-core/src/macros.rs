//! Macro script indexing.
//!
//! A macro script defines one namespace (named after the file) and any
//! number of functions. The script language itself is executed by the
//! external evaluator; here we only index the definitions for the
//! catalog, completion and go-to-definition:
//!
//! ```text
//! def full_name(first, last):
//!     """Concatenates a first and last name."""
//!     ...
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One macro namespace: a script file and its functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroNamespace {
    pub name: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub functions: Vec<MacroFunction>,
}

/// One function of a macro namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroFunction {
    pub name: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    /// 1-based line of the `def`.
    pub line: u32,
}

fn def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^def\s+([A-Za-z_]\w*)\s*\(([^)]*)\)\s*:").expect("valid regex"))
}

/// Indexes a macro script into its namespace record.
///
/// `name` is the namespace name (the file stem); `file_path` is kept
/// for go-to-definition.
pub fn index_script(name: &str, file_path: &str, source: &str) -> MacroNamespace {
    let lines: Vec<&str> = source.lines().collect();
    let mut functions = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = def_regex().captures(line) else {
            continue;
        };
        let fn_name = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let args = parse_args(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
        let docstring = extract_docstring(&lines, idx + 1);
        functions.push(MacroFunction {
            name: fn_name,
            args,
            docstring,
            line: idx as u32 + 1,
        });
    }

    MacroNamespace {
        name: name.to_string(),
        file_path: file_path.to_string(),
        package: None,
        functions,
    }
}

/// Splits an argument list, dropping default values.
fn parse_args(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|arg| arg.split('=').next().unwrap_or("").trim().to_string())
        .filter(|arg| !arg.is_empty())
        .collect()
}

/// Reads a `"""…"""` (or `'''…'''`) docstring starting at `start`.
fn extract_docstring(lines: &[&str], start: usize) -> Option<String> {
    let first = lines.get(start)?.trim();
    let delimiter = if first.starts_with("\"\"\"") {
        "\"\"\""
    } else if first.starts_with("'''") {
        "'''"
    } else {
        return None;
    };

    let after_open = &first[delimiter.len()..];
    if let Some(end) = after_open.find(delimiter) {
        let text = after_open[..end].trim();
        return (!text.is_empty()).then(|| text.to_string());
    }

    let mut collected = vec![after_open.trim().to_string()];
    for line in lines.iter().skip(start + 1) {
        let trimmed = line.trim();
        if let Some(end) = trimmed.find(delimiter) {
            let text = trimmed[..end].trim();
            if !text.is_empty() {
                collected.push(text.to_string());
            }
            break;
        }
        collected.push(trimmed.to_string());
    }
    let joined = collected
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}
