//! Static completion and hover data: builtin template globals, known
//! configuration keys, and the SQL function catalog.

/// A builtin name available at the root of `{{ … }}` expressions.
pub struct BuiltinGlobal {
    pub name: &'static str,
    pub detail: &'static str,
    pub doc: &'static str,
}

pub const GLOBALS: &[BuiltinGlobal] = &[
    BuiltinGlobal {
        name: "config",
        detail: "project configuration",
        doc: "The project configuration: `models_dir`, `target`, and friends.",
    },
    BuiltinGlobal {
        name: "env",
        detail: "environment variables",
        doc: "Environment variables visible to the run.",
    },
    BuiltinGlobal {
        name: "target",
        detail: "resolved warehouse target",
        doc: "The resolved target for the active environment: `type`, `database`, `schema`, …",
    },
    BuiltinGlobal {
        name: "this",
        detail: "the current model",
        doc: "The model being rendered: `this.name`, `this.schema`, `this.path`.",
    },
];

/// Configuration keys offered after `{{ config.`.
pub const CONFIG_KEYS: &[(&str, &str)] = &[
    ("models_dir", "root for model discovery"),
    ("seeds_dir", "root for seed CSVs"),
    ("macros_dir", "root for macro scripts"),
    ("target", "warehouse target table"),
    ("environments", "named environment overrides"),
];

/// One SQL function known to completion and hover.
pub struct SqlFunction {
    pub name: &'static str,
    pub signature: &'static str,
    pub doc: &'static str,
    pub aggregate: bool,
    pub window: bool,
}

pub const SQL_FUNCTIONS: &[SqlFunction] = &[
    SqlFunction { name: "abs", signature: "abs(x)", doc: "Absolute value.", aggregate: false, window: false },
    SqlFunction { name: "avg", signature: "avg(expr)", doc: "Average of non-null values.", aggregate: true, window: false },
    SqlFunction { name: "cast", signature: "cast(expr AS type)", doc: "Converts a value to a type.", aggregate: false, window: false },
    SqlFunction { name: "coalesce", signature: "coalesce(a, b, ...)", doc: "First non-null argument.", aggregate: false, window: false },
    SqlFunction { name: "concat", signature: "concat(a, b, ...)", doc: "Concatenates strings.", aggregate: false, window: false },
    SqlFunction { name: "count", signature: "count(expr | *)", doc: "Row or value count.", aggregate: true, window: false },
    SqlFunction { name: "current_date", signature: "current_date", doc: "Date at statement start.", aggregate: false, window: false },
    SqlFunction { name: "current_timestamp", signature: "current_timestamp", doc: "Timestamp at statement start.", aggregate: false, window: false },
    SqlFunction { name: "date_trunc", signature: "date_trunc(part, ts)", doc: "Truncates a timestamp to a precision.", aggregate: false, window: false },
    SqlFunction { name: "dense_rank", signature: "dense_rank() OVER (...)", doc: "Rank without gaps.", aggregate: false, window: true },
    SqlFunction { name: "lag", signature: "lag(expr [, offset]) OVER (...)", doc: "Value from a preceding row.", aggregate: false, window: true },
    SqlFunction { name: "lead", signature: "lead(expr [, offset]) OVER (...)", doc: "Value from a following row.", aggregate: false, window: true },
    SqlFunction { name: "length", signature: "length(s)", doc: "String length.", aggregate: false, window: false },
    SqlFunction { name: "lower", signature: "lower(s)", doc: "Lowercases a string.", aggregate: false, window: false },
    SqlFunction { name: "max", signature: "max(expr)", doc: "Largest value.", aggregate: true, window: false },
    SqlFunction { name: "min", signature: "min(expr)", doc: "Smallest value.", aggregate: true, window: false },
    SqlFunction { name: "nullif", signature: "nullif(a, b)", doc: "NULL when both arguments are equal.", aggregate: false, window: false },
    SqlFunction { name: "rank", signature: "rank() OVER (...)", doc: "Rank with gaps.", aggregate: false, window: true },
    SqlFunction { name: "round", signature: "round(x [, places])", doc: "Rounds a number.", aggregate: false, window: false },
    SqlFunction { name: "row_number", signature: "row_number() OVER (...)", doc: "Sequential row number.", aggregate: false, window: true },
    SqlFunction { name: "substr", signature: "substr(s, start [, len])", doc: "Substring.", aggregate: false, window: false },
    SqlFunction { name: "sum", signature: "sum(expr)", doc: "Sum of non-null values.", aggregate: true, window: false },
    SqlFunction { name: "trim", signature: "trim(s)", doc: "Strips surrounding whitespace.", aggregate: false, window: false },
    SqlFunction { name: "upper", signature: "upper(s)", doc: "Uppercases a string.", aggregate: false, window: false },
];

pub fn find_global(name: &str) -> Option<&'static BuiltinGlobal> {
    GLOBALS.iter().find(|g| g.name == name)
}

pub fn find_sql_function(name: &str) -> Option<&'static SqlFunction> {
    let lowered = name.to_ascii_lowercase();
    SQL_FUNCTIONS.iter().find(|f| f.name == lowered)
}
