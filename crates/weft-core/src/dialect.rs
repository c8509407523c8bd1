//! SQL dialect registry.
//!
//! A [`Dialect`] bundles the `sqlparser` parser to use, identifier
//! quoting quirks, and the extra lint rules that apply under that
//! dialect. The set is closed; new dialects are added here, not
//! discovered at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL dialect for parsing and analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Generic,
    Postgres,
    Snowflake,
    Bigquery,
    Duckdb,
}

impl Dialect {
    /// All registered dialects, in display order.
    pub const ALL: &'static [Dialect] = &[
        Dialect::Generic,
        Dialect::Postgres,
        Dialect::Snowflake,
        Dialect::Bigquery,
        Dialect::Duckdb,
    ];

    /// Looks up a dialect by its configuration name.
    pub fn from_name(name: &str) -> Option<Dialect> {
        match name.to_ascii_lowercase().as_str() {
            "generic" => Some(Dialect::Generic),
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "snowflake" => Some(Dialect::Snowflake),
            "bigquery" => Some(Dialect::Bigquery),
            "duckdb" => Some(Dialect::Duckdb),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Generic => "generic",
            Dialect::Postgres => "postgres",
            Dialect::Snowflake => "snowflake",
            Dialect::Bigquery => "bigquery",
            Dialect::Duckdb => "duckdb",
        }
    }

    pub fn to_sqlparser(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{
            BigQueryDialect, DuckDbDialect, GenericDialect, PostgreSqlDialect, SnowflakeDialect,
        };
        match self {
            Dialect::Generic => Box::new(GenericDialect {}),
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
            Dialect::Snowflake => Box::new(SnowflakeDialect {}),
            Dialect::Bigquery => Box::new(BigQueryDialect {}),
            Dialect::Duckdb => Box::new(DuckDbDialect {}),
        }
    }

    /// The identifier quote character for this dialect.
    pub fn quote_char(&self) -> char {
        match self {
            Dialect::Bigquery => '`',
            _ => '"',
        }
    }

    /// Whether `ILIKE` is native syntax.
    pub fn supports_ilike(&self) -> bool {
        matches!(
            self,
            Dialect::Postgres | Dialect::Snowflake | Dialect::Duckdb
        )
    }

    /// Whether the `expr::type` cast shorthand is native syntax.
    pub fn supports_double_colon_cast(&self) -> bool {
        matches!(
            self,
            Dialect::Postgres | Dialect::Snowflake | Dialect::Duckdb
        )
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
