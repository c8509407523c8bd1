//! Shared parse cache and project context.
//!
//! The provider is the single gateway for reading parsed artifacts:
//! every consumer (diagnostics, completion, lint, health rules) goes
//! through [`Provider::get_or_parse`], which parses each document
//! version at most once. The batch-loaded [`ProjectContext`] is the
//! read-only project view used by project-level rules; it is built
//! from one round of batch accessors and reused until invalidated.

use crate::EngineError;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::debug;
use weft_core::dialect::Dialect;
use weft_core::frontmatter::{self, FrontmatterResult, Materialized};
use weft_core::lineage::{self, ColumnInfo, LineageResult};
use weft_core::sql::{parse_select, SelectStmt, SqlError};
use weft_core::template::{parse as parse_template, to_placeholder_sql, TemplateError, TemplateNode};
use weft_store::Store;

/// The fully parsed view of one document version.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub version: i32,
    /// The dialect this parse ran under.
    pub dialect: Dialect,
    pub content: String,
    pub frontmatter: FrontmatterResult,
    pub template: Vec<TemplateNode>,
    pub template_errors: Vec<TemplateError>,
    /// Placeholder-substituted body the SQL phase ran on.
    pub placeholder_sql: String,
    pub select: Option<SelectStmt>,
    pub sql_error: Option<SqlError>,
    /// Lineage of the parsed statement, when one parsed.
    pub lineage: Option<LineageResult>,
}

/// One model in the project context.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub file_path: String,
    pub materialized: Materialized,
    pub uses_select_star: bool,
    pub columns: Vec<ColumnInfo>,
}

/// The in-memory, batch-loaded, read-only view of the project.
pub struct ProjectContext {
    /// Model path → model info.
    pub models: BTreeMap<String, ModelInfo>,
    /// Model path → parent paths.
    pub parents: BTreeMap<String, Vec<String>>,
    /// Model path → child paths.
    pub children: BTreeMap<String, Vec<String>>,
    /// Store handle for rules that need history (schema drift).
    pub store: Arc<Store>,
}

impl ProjectContext {
    /// Builds the context with one round of batch accessors.
    pub fn build(store: Arc<Store>) -> Result<Self, EngineError> {
        let models = store.list_models()?;
        let mut columns = store.batch_get_all_columns()?;
        let dependencies = store.batch_get_all_dependencies()?;
        let dependents = store.batch_get_all_dependents()?;

        let path_of: HashMap<i64, String> =
            models.iter().map(|m| (m.id, m.path.clone())).collect();

        let mut context = ProjectContext {
            models: BTreeMap::new(),
            parents: BTreeMap::new(),
            children: BTreeMap::new(),
            store,
        };
        for model in models {
            let parents = dependencies
                .get(&model.id)
                .map(|ids| ids.iter().filter_map(|id| path_of.get(id).cloned()).collect())
                .unwrap_or_default();
            let children = dependents
                .get(&model.id)
                .map(|ids| ids.iter().filter_map(|id| path_of.get(id).cloned()).collect())
                .unwrap_or_default();
            context.parents.insert(model.path.clone(), parents);
            context.children.insert(model.path.clone(), children);
            context.models.insert(
                model.path.clone(),
                ModelInfo {
                    id: model.id,
                    name: model.name,
                    file_path: model.file_path,
                    materialized: model.materialized,
                    uses_select_star: model.uses_select_star,
                    columns: columns.remove(&model.path).unwrap_or_default(),
                    path: model.path,
                },
            );
        }
        Ok(context)
    }

    /// The columns a model reads from each of its source tables, in
    /// first-reference order. Shared by the runner (snapshot writes)
    /// and the drift rule (snapshot compares).
    pub fn source_columns_of(&self, model_path: &str) -> BTreeMap<String, Vec<String>> {
        let mut by_table: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let Some(model) = self.models.get(model_path) else {
            return by_table;
        };
        for column in &model.columns {
            for source in &column.sources {
                let entry = by_table.entry(source.table.clone()).or_default();
                if !entry.contains(&source.column) {
                    entry.push(source.column.clone());
                }
            }
        }
        by_table
    }
}

/// One-parse-per-version cache over documents, plus the lazily built
/// project context.
pub struct Provider {
    store: Arc<Store>,
    dialect: RwLock<Dialect>,
    cache: RwLock<HashMap<String, Arc<ParsedDocument>>>,
    project: RwLock<Option<Arc<ProjectContext>>>,
}

impl Provider {
    pub fn new(store: Arc<Store>, dialect: Dialect) -> Self {
        Self {
            store,
            dialect: RwLock::new(dialect),
            cache: RwLock::new(HashMap::new()),
            project: RwLock::new(None),
        }
    }

    pub fn dialect(&self) -> Dialect {
        *self.dialect.read().expect("dialect lock poisoned")
    }

    /// Changes the dialect; every cached parse is invalidated.
    pub fn set_dialect(&self, dialect: Dialect) {
        *self.dialect.write().expect("dialect lock poisoned") = dialect;
        self.cache.write().expect("cache lock poisoned").clear();
        self.invalidate_project_context();
    }

    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Returns the cached parse when the cached version is current,
    /// otherwise re-parses all phases and stores the result.
    pub fn get_or_parse(&self, uri: &str, content: &str, version: i32) -> Arc<ParsedDocument> {
        {
            let cache = self.cache.read().expect("cache lock poisoned");
            if let Some(document) = cache.get(uri) {
                if document.version >= version {
                    return Arc::clone(document);
                }
            }
        }
        let mut cache = self.cache.write().expect("cache lock poisoned");
        // A racing writer may have parsed a newer version already.
        if let Some(document) = cache.get(uri) {
            if document.version >= version {
                return Arc::clone(document);
            }
        }
        let document = Arc::new(parse_document(content, version, self.dialect()));
        debug!(uri, version, "parsed document");
        cache.insert(uri.to_string(), Arc::clone(&document));
        document
    }

    /// The cached parse of a URI, when one exists.
    pub fn get_cached(&self, uri: &str) -> Option<Arc<ParsedDocument>> {
        self.cache
            .read()
            .expect("cache lock poisoned")
            .get(uri)
            .cloned()
    }

    /// Drops one URI from the cache.
    pub fn invalidate(&self, uri: &str) {
        self.cache.write().expect("cache lock poisoned").remove(uri);
    }

    /// The project context, built on first use.
    pub fn project_context(&self) -> Result<Arc<ProjectContext>, EngineError> {
        {
            let project = self.project.read().expect("project lock poisoned");
            if let Some(context) = project.as_ref() {
                return Ok(Arc::clone(context));
            }
        }
        let mut project = self.project.write().expect("project lock poisoned");
        if let Some(context) = project.as_ref() {
            return Ok(Arc::clone(context));
        }
        let context = Arc::new(ProjectContext::build(Arc::clone(&self.store))?);
        *project = Some(Arc::clone(&context));
        Ok(context)
    }

    /// Must be called after any mutation of the underlying state.
    pub fn invalidate_project_context(&self) {
        *self.project.write().expect("project lock poisoned") = None;
    }
}

fn parse_document(content: &str, version: i32, dialect: Dialect) -> ParsedDocument {
    let front = frontmatter::extract(content);
    let (template, template_errors) = parse_template(content);
    let placeholder_sql = to_placeholder_sql(content);
    let (select, sql_error) = match parse_select(&placeholder_sql, dialect) {
        Ok(stmt) => (stmt, None),
        Err(err) => (None, Some(err)),
    };
    let lineage = select.as_ref().map(|stmt| lineage::analyze(stmt, dialect));
    ParsedDocument {
        version,
        dialect,
        content: content.to_string(),
        frontmatter: front,
        template,
        template_errors,
        placeholder_sql,
        select,
        sql_error,
        lineage,
    }
}
