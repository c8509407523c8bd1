//! Front-matter extraction for model files.
//!
//! A model file may begin with a typed YAML header delimited by `/*---`
//! and `---*/`. The delimiters make the header a SQL block comment, so
//! the body handed to the SQL phase can keep the header verbatim and
//! source positions stay file-relative throughout the pipeline.
//!
//! Header errors are recoverable: the rest of the file still parses, and
//! the errors surface as `E001` diagnostics.

use crate::types::position_at;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Opening delimiter of the front-matter header.
pub const HEADER_OPEN: &str = "/*---";
/// Closing delimiter of the front-matter header.
pub const HEADER_CLOSE: &str = "---*/";

/// The closed set of recognized header fields.
const FIELDS: &[&str] = &[
    "name",
    "materialized",
    "unique_key",
    "owner",
    "schema",
    "tags",
    "tests",
    "meta",
    "description",
];

/// How the warehouse realizes a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Materialized {
    Table,
    #[default]
    View,
    Incremental,
}

impl Materialized {
    pub fn as_str(&self) -> &'static str {
        match self {
            Materialized::Table => "table",
            Materialized::View => "view",
            Materialized::Incremental => "incremental",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "table" => Some(Materialized::Table),
            "view" => Some(Materialized::View),
            "incremental" => Some(Materialized::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for Materialized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The typed front-matter header of a model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materialized: Option<Materialized>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelHeader {
    /// Serializes the header back to YAML (round-trips through [`extract`]).
    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }
}

/// Error raised while extracting the front-matter header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrontmatterError {
    #[error("front-matter YAML error at line {line}: {message}")]
    Parse { line: u32, message: String },
    #[error("unknown front-matter field `{field}`")]
    UnknownField { field: String },
    #[error("front-matter header opened with `/*---` but never closed with `---*/`")]
    Unclosed,
}

/// Result of front-matter extraction.
///
/// `body_offset` is the byte offset of the first character after the
/// header (0 when no header is present). All errors are recoverable;
/// `header` holds whatever fields could be decoded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrontmatterResult {
    pub has_header: bool,
    pub header: ModelHeader,
    pub body_offset: usize,
    pub errors: Vec<FrontmatterError>,
}

/// Extracts the optional front-matter header from a model file.
pub fn extract(source: &str) -> FrontmatterResult {
    let trimmed_start = source.len() - source.trim_start().len();
    if !source[trimmed_start..].starts_with(HEADER_OPEN) {
        return FrontmatterResult::default();
    }
    let yaml_start = trimmed_start + HEADER_OPEN.len();

    let Some(close_rel) = source[yaml_start..].find(HEADER_CLOSE) else {
        return FrontmatterResult {
            has_header: false,
            header: ModelHeader::default(),
            body_offset: 0,
            errors: vec![FrontmatterError::Unclosed],
        };
    };
    let yaml_end = yaml_start + close_rel;
    let body_offset = yaml_end + HEADER_CLOSE.len();
    let yaml = &source[yaml_start..yaml_end];

    // Lines before the YAML block, so error lines are file-relative.
    let line_offset = position_at(source, yaml_start).line - 1;

    let mut errors = Vec::new();
    let value: serde_yaml::Value = match serde_yaml::from_str(yaml) {
        Ok(v) => v,
        Err(err) => {
            errors.push(parse_error(&err, line_offset));
            return FrontmatterResult {
                has_header: true,
                header: ModelHeader::default(),
                body_offset,
                errors,
            };
        }
    };

    if let serde_yaml::Value::Mapping(ref mapping) = value {
        for key in mapping.keys() {
            if let serde_yaml::Value::String(field) = key {
                if !FIELDS.contains(&field.as_str()) {
                    errors.push(FrontmatterError::UnknownField {
                        field: field.clone(),
                    });
                }
            }
        }
    }

    let header = match serde_yaml::from_value::<ModelHeader>(value) {
        Ok(header) => header,
        Err(err) => {
            errors.push(parse_error(&err, line_offset));
            ModelHeader::default()
        }
    };

    FrontmatterResult {
        has_header: true,
        header,
        body_offset,
        errors,
    }
}

fn parse_error(err: &serde_yaml::Error, line_offset: u32) -> FrontmatterError {
    let line = err
        .location()
        .map(|loc| loc.line() as u32 + line_offset)
        .unwrap_or(line_offset + 1);
    FrontmatterError::Parse {
        line,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "/*---\nname: users\nmaterialized: table\nunique_key: id\nowner: data-eng\nschema: analytics\ntags: [core, daily]\ntests: [not_null(id)]\nmeta:\n  priority: 1\ndescription: All users\n---*/\nSELECT 1";

    #[test]
    fn extracts_full_header() {
        let result = extract(FULL);
        assert!(result.has_header);
        assert!(result.errors.is_empty());
        assert_eq!(result.header.name.as_deref(), Some("users"));
        assert_eq!(result.header.materialized, Some(Materialized::Table));
        assert_eq!(result.header.tags, vec!["core", "daily"]);
        assert_eq!(
            result.header.meta.get("priority"),
            Some(&serde_json::json!(1))
        );
        assert_eq!(&FULL[result.body_offset..], "\nSELECT 1");
    }

    #[test]
    fn no_header_is_all_body() {
        let result = extract("SELECT 1");
        assert!(!result.has_header);
        assert_eq!(result.body_offset, 0);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn unknown_field_is_reported_but_rest_parses() {
        let src = "/*---\nname: a\nfrequency: daily\n---*/\nSELECT 1";
        let result = extract(src);
        assert!(result.has_header);
        assert_eq!(
            result.errors,
            vec![FrontmatterError::UnknownField {
                field: "frequency".into()
            }]
        );
        assert_eq!(result.header.name.as_deref(), Some("a"));
    }

    #[test]
    fn malformed_yaml_reports_file_relative_line() {
        let src = "/*---\nname: [unclosed\n---*/\nSELECT 1";
        let result = extract(src);
        assert!(result.has_header);
        assert_eq!(result.errors.len(), 1);
        match &result.errors[0] {
            FrontmatterError::Parse { line, .. } => assert!(*line >= 2),
            other => panic!("expected parse error, got {other:?}"),
        }
        // Body still reachable for the later phases.
        assert_eq!(&src[result.body_offset..], "\nSELECT 1");
    }

    #[test]
    fn unclosed_header_keeps_whole_file_as_body() {
        let result = extract("/*---\nname: a\nSELECT 1");
        assert!(!result.has_header);
        assert_eq!(result.body_offset, 0);
        assert_eq!(result.errors, vec![FrontmatterError::Unclosed]);
    }

    #[test]
    fn round_trips_through_yaml() {
        let first = extract(FULL);
        let yaml = first.header.to_yaml();
        let wrapped = format!("/*---\n{yaml}---*/\nSELECT 1");
        let second = extract(&wrapped);
        assert!(second.errors.is_empty());
        assert_eq!(first.header, second.header);
    }

    #[test]
    fn bad_field_type_degrades_to_default_header() {
        let src = "/*---\ntags: notalist\n---*/\nSELECT 1";
        let result = extract(src);
        assert!(result.has_header);
        assert_eq!(result.errors.len(), 1);
        assert!(result.header.tags.is_empty());
    }
}
