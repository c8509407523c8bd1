//! Core parsing and analysis engine for weft SQL models.
//!
//! A model file is processed in three phases, each of which can fail
//! independently without aborting the ones that can still run:
//!
//! ```text
//! file → [frontmatter] → body → [template] → placeholder SQL → [sql] → SelectStmt
//!                                                                      → [lineage]
//!                                                                      → [linter]
//! ```
//!
//! - [`frontmatter`] extracts the typed `/*--- … ---*/` YAML header.
//! - [`template`] lexes and parses the `{{ … }}` / `{* … *}` templating
//!   layer and produces a placeholder-substituted body the SQL parser
//!   accepts.
//! - [`sql`] parses dialect-specific SQL (via `sqlparser`) and lowers it
//!   into an owned [`sql::SelectStmt`] tree with source positions.
//! - [`lineage`] derives output columns, per-column source edges and the
//!   referenced table set from a lowered statement.
//! - [`linter`] runs per-statement rules producing diagnostics with
//!   optional autofixes.

pub mod dialect;
pub mod frontmatter;
pub mod lineage;
pub mod linter;
pub mod macros;
pub mod sql;
pub mod template;
pub mod text;
pub mod types;

pub use dialect::Dialect;
pub use frontmatter::{FrontmatterError, FrontmatterResult, Materialized, ModelHeader};
pub use lineage::{ColumnInfo, ColumnSource, LineageResult, Transform};
pub use linter::{LintContext, LintRule};
pub use sql::{SelectStmt, SqlError};
pub use template::{TemplateError, TemplateNode};
pub use types::{Diagnostic, Fix, Position, Severity, Span, TextEdit};
