//! Dependency DAG: build, cycle detection, deterministic topological
//! order, selector-based subgraphs, and run execution.

use crate::driver::WarehouseDriver;
use crate::eval::{ExprEval, Scope};
use crate::provider::{ModelInfo, ProjectContext};
use crate::render::render_body;
use crate::EngineError;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;
use tracing::{info, warn};
use weft_core::frontmatter::Materialized;
use weft_store::{ModelRunStatus, RunStatus, Store};

/// The project dependency graph over model paths.
pub struct Dag {
    /// path → parent paths (edges point at prerequisites).
    parents: BTreeMap<String, Vec<String>>,
    /// path → child paths.
    children: BTreeMap<String, Vec<String>>,
}

impl Dag {
    pub fn build(context: &ProjectContext) -> Self {
        Self {
            parents: context.parents.clone(),
            children: context.children.clone(),
        }
    }

    /// Finds a dependency cycle, if any, as a path list.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut stack: Vec<&str> = Vec::new();

        fn visit<'a>(
            node: &'a str,
            parents: &'a BTreeMap<String, Vec<String>>,
            marks: &mut BTreeMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(node) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|s| s.to_string()).collect();
                    cycle.sort();
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            stack.push(node);
            if let Some(node_parents) = parents.get(node) {
                for parent in node_parents {
                    if !parents.contains_key(parent.as_str()) {
                        continue;
                    }
                    if let Some(cycle) = visit(parent, parents, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let nodes: Vec<&str> = self.parents.keys().map(|s| s.as_str()).collect();
        for node in nodes {
            if let Some(cycle) = visit(node, &self.parents, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    /// Deterministic topological order: parents before children, ties
    /// broken by path.
    pub fn topo_order(&self) -> Result<Vec<String>, EngineError> {
        if let Some(cycle) = self.find_cycle() {
            return Err(EngineError::CyclicDependency { cycle });
        }
        let mut remaining_parents: BTreeMap<&str, BTreeSet<&str>> = self
            .parents
            .iter()
            .map(|(path, parents)| {
                let live: BTreeSet<&str> = parents
                    .iter()
                    .map(|p| p.as_str())
                    .filter(|p| self.parents.contains_key(*p))
                    .collect();
                (path.as_str(), live)
            })
            .collect();

        let mut ready: BTreeSet<&str> = remaining_parents
            .iter()
            .filter(|(_, parents)| parents.is_empty())
            .map(|(path, _)| *path)
            .collect();
        let mut order = Vec::with_capacity(remaining_parents.len());

        while let Some(&next) = ready.iter().next() {
            ready.remove(next);
            order.push(next.to_string());
            if let Some(children) = self.children.get(next) {
                for child in children {
                    if let Some(parents) = remaining_parents.get_mut(child.as_str()) {
                        parents.remove(next);
                        if parents.is_empty() && !order.contains(child) {
                            ready.insert(child.as_str());
                        }
                    }
                }
            }
        }
        Ok(order)
    }

    /// Resolves a selector list into the set of models to run.
    ///
    /// Grammar per selector: `name` (just the model), `+name` (model
    /// and ancestors), `name+` (model and descendants), `+name+`
    /// (both).
    pub fn select(&self, selectors: &[String]) -> Result<BTreeSet<String>, EngineError> {
        let mut selected = BTreeSet::new();
        for selector in selectors {
            let with_ancestors = selector.starts_with('+');
            let with_descendants = selector.ends_with('+') && selector.len() > 1;
            let name = selector.trim_matches('+');
            if !self.parents.contains_key(name) {
                return Err(EngineError::UnknownSelector(name.to_string()));
            }
            selected.insert(name.to_string());
            if with_ancestors {
                self.collect_closure(name, &self.parents, &mut selected);
            }
            if with_descendants {
                self.collect_closure(name, &self.children, &mut selected);
            }
        }
        Ok(selected)
    }

    fn collect_closure(
        &self,
        start: &str,
        edges: &BTreeMap<String, Vec<String>>,
        selected: &mut BTreeSet<String>,
    ) {
        let mut queue = vec![start.to_string()];
        while let Some(node) = queue.pop() {
            if let Some(next) = edges.get(&node) {
                for neighbor in next {
                    if self.parents.contains_key(neighbor) && selected.insert(neighbor.clone()) {
                        queue.push(neighbor.clone());
                    }
                }
            }
        }
    }
}

/// Options for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub environment: String,
    /// Selector expressions; empty means the whole project.
    pub select: Vec<String>,
    /// Project configuration handed to the evaluator under `config`.
    pub config: serde_json::Value,
    /// Extra scope handed to the evaluator under `env`.
    pub env_vars: BTreeMap<String, String>,
    /// Target description handed to the evaluator under `target`.
    pub target: serde_json::Value,
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: i64,
    pub status: RunStatus,
    pub results: Vec<(String, ModelRunStatus)>,
}

/// Executes the selected subgraph in topological order with
/// at-most-once semantics per model.
///
/// A model failure marks its downstream as `skipped` and the run as
/// `failed`; completed models on other branches are not rolled back.
pub fn execute_run(
    context: &ProjectContext,
    store: &Store,
    driver: &dyn WarehouseDriver,
    evaluator: &dyn ExprEval,
    options: &RunOptions,
) -> Result<RunOutcome, EngineError> {
    let environment = if options.environment.is_empty() {
        "default"
    } else {
        &options.environment
    };
    store.create_environment(environment)?;
    let run = store.create_run(environment)?;
    let dag = Dag::build(context);

    let order = match dag.topo_order() {
        Ok(order) => order,
        Err(err) => {
            store.finish_run(run.id, RunStatus::Failed, Some(&err.to_string()))?;
            return Err(err);
        }
    };
    let selected: BTreeSet<String> = if options.select.is_empty() {
        order.iter().cloned().collect()
    } else {
        match dag.select(&options.select) {
            Ok(selected) => selected,
            Err(err) => {
                store.finish_run(run.id, RunStatus::Failed, Some(&err.to_string()))?;
                return Err(err);
            }
        }
    };

    let mut executed: HashSet<i64> = HashSet::new();
    let mut failed_paths: HashSet<String> = HashSet::new();
    let mut results = Vec::new();
    let mut run_failed = false;

    for path in order.iter().filter(|p| selected.contains(*p)) {
        let Some(model) = context.models.get(path) else {
            continue;
        };
        // At most once per model id per run.
        if !executed.insert(model.id) {
            continue;
        }

        let upstream_failed = context
            .parents
            .get(path)
            .map(|parents| parents.iter().any(|p| failed_paths.contains(p)))
            .unwrap_or(false);
        if upstream_failed {
            store.record_model_run_skipped(run.id, model.id)?;
            failed_paths.insert(path.clone());
            results.push((path.clone(), ModelRunStatus::Skipped));
            continue;
        }

        let model_run_id = store.start_model_run(run.id, model.id)?;
        let started = Instant::now();
        match materialize(store, driver, evaluator, options, model) {
            Ok(rows_affected) => {
                let elapsed = started.elapsed().as_millis() as i64;
                store.finish_model_run(
                    model_run_id,
                    ModelRunStatus::Success,
                    rows_affected as i64,
                    elapsed,
                    None,
                )?;
                // Snapshot the observed source columns for drift
                // analysis.
                for (source_table, columns) in context.source_columns_of(path) {
                    store.save_snapshot(path, &source_table, &columns, run.id)?;
                }
                info!(model = %path, rows = rows_affected, "model materialized");
                results.push((path.clone(), ModelRunStatus::Success));
            }
            Err(err) => {
                let elapsed = started.elapsed().as_millis() as i64;
                store.finish_model_run(
                    model_run_id,
                    ModelRunStatus::Failed,
                    0,
                    elapsed,
                    Some(&err.to_string()),
                )?;
                warn!(model = %path, error = %err, "model failed; skipping downstream");
                failed_paths.insert(path.clone());
                results.push((path.clone(), ModelRunStatus::Failed));
                run_failed = true;
            }
        }
    }

    let status = if run_failed {
        RunStatus::Failed
    } else {
        RunStatus::Completed
    };
    store.finish_run(
        run.id,
        status,
        run_failed.then_some("one or more models failed"),
    )?;
    Ok(RunOutcome {
        run_id: run.id,
        status,
        results,
    })
}

fn materialize(
    store: &Store,
    driver: &dyn WarehouseDriver,
    evaluator: &dyn ExprEval,
    options: &RunOptions,
    model: &ModelInfo,
) -> Result<u64, EngineError> {
    let record = store.get_model(model.id)?;
    let body = strip_header(&record.raw_content);
    let mut scope = Scope::new();
    scope.insert(
        "this".into(),
        json!({
            "name": record.name,
            "path": record.path,
            "schema": record.schema,
            "meta": record.meta,
        }),
    );
    scope.insert("config".into(), options.config.clone());
    scope.insert("env".into(), json!(options.env_vars));
    scope.insert("target".into(), options.target.clone());

    let rendered = render_body(body, evaluator, &scope).map_err(|err| EngineError::Render {
        path: record.path.clone(),
        message: err.to_string(),
    })?;
    let select = rendered.trim().trim_end_matches(';');
    let relation = driver.qualify(record.schema.as_deref(), &record.path);

    let rows = match record.materialized {
        Materialized::View => {
            driver.execute(&format!("DROP VIEW IF EXISTS \"{relation}\""))?;
            driver.execute(&format!("CREATE VIEW \"{relation}\" AS {select}"))?
        }
        Materialized::Table => {
            driver.execute(&format!("DROP TABLE IF EXISTS \"{relation}\""))?;
            driver.execute(&format!("CREATE TABLE \"{relation}\" AS {select}"))?
        }
        Materialized::Incremental => {
            if driver.table_exists(&relation)? {
                driver.execute(&format!("INSERT INTO \"{relation}\" {select}"))?
            } else {
                driver.execute(&format!("CREATE TABLE \"{relation}\" AS {select}"))?
            }
        }
    };
    Ok(rows)
}

/// Drops the front-matter header before rendering: the header already
/// drove model registration, and some warehouses reject leading
/// comments in DDL bodies.
fn strip_header(content: &str) -> &str {
    let front = weft_core::frontmatter::extract(content);
    if front.has_header {
        &content[front.body_offset..]
    } else {
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqliteDriver;
    use crate::eval::MinijinjaEval;
    use crate::provider::ProjectContext;
    use std::sync::Arc;
    use weft_store::NewModel;

    fn register(store: &Store, path: &str, sql: &str, materialized: Materialized) -> i64 {
        store
            .register_model(&NewModel {
                path: path.into(),
                name: path.into(),
                materialized,
                file_path: format!("models/{path}.sql"),
                content_hash: "h".into(),
                sql_content: sql.into(),
                raw_content: sql.into(),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    fn chain_store() -> Arc<Store> {
        // base ← mid ← top
        let store = Arc::new(Store::open_in_memory().unwrap());
        let base = register(
            &store,
            "base",
            "SELECT 1 AS id UNION ALL SELECT 2",
            Materialized::Table,
        );
        let mid = register(&store, "mid", "SELECT id FROM \"base\"", Materialized::Table);
        let top = register(&store, "top", "SELECT id FROM \"mid\"", Materialized::View);
        store.set_dependencies(mid, &[base]).unwrap();
        store.set_dependencies(top, &[mid]).unwrap();
        store
    }

    fn run_all(store: &Arc<Store>, driver: &SqliteDriver) -> RunOutcome {
        let context = ProjectContext::build(Arc::clone(store)).unwrap();
        execute_run(
            &context,
            store,
            driver,
            &MinijinjaEval,
            &RunOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn topo_order_is_parents_first_and_stable() {
        let store = chain_store();
        let context = ProjectContext::build(Arc::clone(&store)).unwrap();
        let order = Dag::build(&context).topo_order().unwrap();
        assert_eq!(order, vec!["base", "mid", "top"]);
    }

    #[test]
    fn no_edge_points_backward_in_topo_order() {
        // Diamond plus a stray leaf.
        let store = Arc::new(Store::open_in_memory().unwrap());
        let a = register(&store, "a", "SELECT 1", Materialized::Table);
        let b = register(&store, "b", "SELECT 1", Materialized::Table);
        let c = register(&store, "c", "SELECT 1", Materialized::Table);
        let d = register(&store, "d", "SELECT 1", Materialized::Table);
        register(&store, "leaf", "SELECT 1", Materialized::Table);
        store.set_dependencies(b, &[a]).unwrap();
        store.set_dependencies(c, &[a]).unwrap();
        store.set_dependencies(d, &[b, c]).unwrap();

        let context = ProjectContext::build(Arc::clone(&store)).unwrap();
        let order = Dag::build(&context).topo_order().unwrap();
        let index_of = |path: &str| order.iter().position(|p| p == path).unwrap();
        for (child, parents) in &context.parents {
            for parent in parents {
                assert!(
                    index_of(parent) < index_of(child),
                    "edge {parent} -> {child} points backward in {order:?}"
                );
            }
        }
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn selector_closures() {
        let store = chain_store();
        let context = ProjectContext::build(Arc::clone(&store)).unwrap();
        let dag = Dag::build(&context);

        let only: Vec<_> = dag.select(&["mid".into()]).unwrap().into_iter().collect();
        assert_eq!(only, vec!["mid"]);

        let ancestors: Vec<_> = dag.select(&["+mid".into()]).unwrap().into_iter().collect();
        assert_eq!(ancestors, vec!["base", "mid"]);

        let descendants: Vec<_> = dag.select(&["mid+".into()]).unwrap().into_iter().collect();
        assert_eq!(descendants, vec!["mid", "top"]);

        let both: Vec<_> = dag.select(&["+mid+".into()]).unwrap().into_iter().collect();
        assert_eq!(both, vec!["base", "mid", "top"]);

        assert!(matches!(
            dag.select(&["missing".into()]).unwrap_err(),
            EngineError::UnknownSelector(_)
        ));
    }

    #[test]
    fn run_materializes_in_order() {
        let store = chain_store();
        let driver = SqliteDriver::open_in_memory().unwrap();
        let outcome = run_all(&store, &driver);
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(
            driver.query_scalar("SELECT COUNT(*) FROM \"top\"").unwrap(),
            2
        );
        let statuses: Vec<_> = outcome.results.iter().map(|(_, s)| *s).collect();
        assert_eq!(statuses, vec![ModelRunStatus::Success; 3]);
    }

    #[test]
    fn failure_skips_downstream_and_fails_the_run() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let base = register(&store, "base", "SELECT 1 AS id", Materialized::Table);
        let broken = register(
            &store,
            "broken",
            "SELECT missing_col FROM \"base\"",
            Materialized::Table,
        );
        let downstream = register(
            &store,
            "downstream",
            "SELECT * FROM \"broken\"",
            Materialized::Table,
        );
        let sibling = register(&store, "sibling", "SELECT 2 AS x", Materialized::Table);
        store.set_dependencies(broken, &[base]).unwrap();
        store.set_dependencies(downstream, &[broken]).unwrap();
        let _ = sibling;

        let driver = SqliteDriver::open_in_memory().unwrap();
        let context = ProjectContext::build(Arc::clone(&store)).unwrap();
        let outcome = execute_run(
            &context,
            &store,
            &driver,
            &MinijinjaEval,
            &RunOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.status, RunStatus::Failed);
        let by_path: BTreeMap<_, _> = outcome.results.iter().cloned().collect();
        assert_eq!(by_path["base"], ModelRunStatus::Success);
        assert_eq!(by_path["broken"], ModelRunStatus::Failed);
        assert_eq!(by_path["downstream"], ModelRunStatus::Skipped);
        // Unrelated branches are not rolled back.
        assert_eq!(by_path["sibling"], ModelRunStatus::Success);
        assert!(driver.table_exists("sibling").unwrap());
    }

    #[test]
    fn cycle_aborts_before_any_model_runs() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let a = register(&store, "a", "SELECT 1", Materialized::Table);
        let b = register(&store, "b", "SELECT 2", Materialized::Table);
        store.set_dependencies(a, &[b]).unwrap();
        store.set_dependencies(b, &[a]).unwrap();

        let driver = SqliteDriver::open_in_memory().unwrap();
        let context = ProjectContext::build(Arc::clone(&store)).unwrap();
        let err = execute_run(
            &context,
            &store,
            &driver,
            &MinijinjaEval,
            &RunOptions::default(),
        )
        .unwrap_err();

        match err {
            EngineError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b"]);
            }
            other => panic!("expected cycle error, got {other}"),
        }
        // No model rows were written for the failed run.
        let run = store.list_runs(1).unwrap().remove(0);
        assert_eq!(run.status, RunStatus::Failed);
        assert!(store.list_model_runs(run.id).unwrap().is_empty());
    }

    #[test]
    fn rendered_templates_execute() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        register(
            &store,
            "templated",
            "SELECT {* for n in [1, 2]: *}{{ n }} AS c{{ n }}, {* endfor *}0 AS tail",
            Materialized::Table,
        );
        let driver = SqliteDriver::open_in_memory().unwrap();
        let outcome = run_all(&store, &driver);
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(
            driver
                .query_scalar("SELECT c1 + c2 FROM \"templated\"")
                .unwrap(),
            3
        );
    }

    #[test]
    fn incremental_appends_on_second_run() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        register(
            &store,
            "inc",
            "SELECT 1 AS id",
            Materialized::Incremental,
        );
        let driver = SqliteDriver::open_in_memory().unwrap();
        run_all(&store, &driver);
        run_all(&store, &driver);
        assert_eq!(
            driver.query_scalar("SELECT COUNT(*) FROM \"inc\"").unwrap(),
            2
        );
    }
}
