//! Durable records managed by the store.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use weft_core::frontmatter::Materialized;

/// The durable record for one SQL model file.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Stable id; survives content updates.
    pub id: i64,
    /// Dotted project path, globally unique (e.g. `staging.users`).
    pub path: String,
    pub name: String,
    pub materialized: Materialized,
    pub unique_key: Option<String>,
    pub file_path: String,
    pub owner: Option<String>,
    pub schema: Option<String>,
    pub tags: Vec<String>,
    pub tests: Vec<String>,
    pub meta: BTreeMap<String, serde_json::Value>,
    pub uses_select_star: bool,
    pub content_hash: String,
    pub sql_content: String,
    pub raw_content: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering (upserting) a model.
#[derive(Debug, Clone, Default)]
pub struct NewModel {
    pub path: String,
    pub name: String,
    pub materialized: Materialized,
    pub unique_key: Option<String>,
    pub file_path: String,
    pub owner: Option<String>,
    pub schema: Option<String>,
    pub tags: Vec<String>,
    pub tests: Vec<String>,
    pub meta: BTreeMap<String, serde_json::Value>,
    pub uses_select_star: bool,
    pub content_hash: String,
    pub sql_content: String,
    pub raw_content: String,
    pub description: Option<String>,
}

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one model within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl ModelRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRunStatus::Pending => "pending",
            ModelRunStatus::Running => "running",
            ModelRunStatus::Success => "success",
            ModelRunStatus::Failed => "failed",
            ModelRunStatus::Skipped => "skipped",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ModelRunStatus::Pending),
            "running" => Some(ModelRunStatus::Running),
            "success" => Some(ModelRunStatus::Success),
            "failed" => Some(ModelRunStatus::Failed),
            "skipped" => Some(ModelRunStatus::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for ModelRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub id: i64,
    pub environment: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// One model's execution within a run. Never mutated after its run
/// finalizes.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRun {
    pub id: i64,
    pub run_id: i64,
    pub model_id: i64,
    pub status: ModelRunStatus,
    pub rows_affected: i64,
    pub execution_ms: i64,
    pub error: Option<String>,
}

/// A named target environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub name: String,
    pub commit_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A column observed from a source table during a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotColumn {
    pub model_path: String,
    pub source_table: String,
    pub column_name: String,
    pub column_index: i64,
    pub run_id: i64,
    pub snapshot_at: DateTime<Utc>,
}

/// A model listing row for docs output, with its derived folder.
#[derive(Debug, Clone, PartialEq)]
pub struct DocsModel {
    pub path: String,
    pub name: String,
    pub folder: String,
    pub materialized: Materialized,
    pub description: Option<String>,
}

/// A column referenced from a table that is not itself a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub source_table: String,
    pub column: String,
    pub referenced_by: Vec<String>,
}

/// Node of the column-lineage graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineageNode {
    pub table: String,
    pub column: String,
    pub is_model: bool,
}

/// Edge of the column-lineage graph: source column feeds target column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageEdge {
    pub source_table: String,
    pub source_column: String,
    pub target_model: String,
    pub target_column: String,
}
