//! Environments, runs, and per-model run accounting.

use crate::error::{Result, StoreError};
use crate::types::{Environment, ModelRun, ModelRunStatus, Run, RunStatus};
use crate::Store;
use chrono::Utc;
use rusqlite::{params, Row};

impl Store {
    /// Creates the environment if it does not exist yet.
    pub fn create_environment(&self, name: &str) -> Result<Environment> {
        self.write(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO environments (name, commit_ref, created_at) \
                 VALUES (?1, NULL, ?2)",
                params![name, Utc::now()],
            )?;
            tx.query_row(
                "SELECT name, commit_ref, created_at FROM environments WHERE name = ?1",
                [name],
                row_to_environment,
            )
            .map_err(Into::into)
        })
    }

    pub fn get_environment(&self, name: &str) -> Result<Environment> {
        self.read(|conn| {
            conn.query_row(
                "SELECT name, commit_ref, created_at FROM environments WHERE name = ?1",
                [name],
                row_to_environment,
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::not_found("environment", name)
                }
                other => other.into(),
            })
        })
    }

    pub fn set_environment_commit(&self, name: &str, commit_ref: &str) -> Result<()> {
        self.write(|tx| {
            let changed = tx.execute(
                "UPDATE environments SET commit_ref = ?1 WHERE name = ?2",
                params![commit_ref, name],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("environment", name));
            }
            Ok(())
        })
    }

    /// Starts a new run in `environment`.
    pub fn create_run(&self, environment: &str) -> Result<Run> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO runs (environment, status, started_at) VALUES (?1, 'running', ?2)",
                params![environment, Utc::now()],
            )?;
            let id = tx.last_insert_rowid();
            tx.query_row(&run_query("id = ?1"), [id], row_to_run)?
        })
    }

    /// Finalizes a run. Runs are never mutated after this.
    pub fn finish_run(&self, run_id: i64, status: RunStatus, error: Option<&str>) -> Result<()> {
        self.write(|tx| {
            let changed = tx.execute(
                "UPDATE runs SET status = ?1, completed_at = ?2, error = ?3 WHERE id = ?4",
                params![status.as_str(), Utc::now(), error, run_id],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("run", run_id.to_string()));
            }
            Ok(())
        })
    }

    pub fn get_run(&self, run_id: i64) -> Result<Run> {
        self.read(|conn| {
            conn.query_row(&run_query("id = ?1"), [run_id], row_to_run)
                .map_err(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => {
                        StoreError::not_found("run", run_id.to_string())
                    }
                    other => other.into(),
                })?
        })
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<Run>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, environment, status, started_at, completed_at, error FROM runs \
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit as i64], row_to_run)?;
            let mut runs = Vec::new();
            for row in rows {
                runs.push(row??);
            }
            Ok(runs)
        })
    }

    /// Records that a model started executing within a run.
    pub fn start_model_run(&self, run_id: i64, model_id: i64) -> Result<i64> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO model_runs (run_id, model_id, status) VALUES (?1, ?2, 'running')",
                params![run_id, model_id],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Records a model run that never started (cycle member or
    /// downstream of a failure).
    pub fn record_model_run_skipped(&self, run_id: i64, model_id: i64) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO model_runs (run_id, model_id, status) VALUES (?1, ?2, 'skipped')",
                params![run_id, model_id],
            )?;
            Ok(())
        })
    }

    /// Finalizes one model's run record.
    pub fn finish_model_run(
        &self,
        model_run_id: i64,
        status: ModelRunStatus,
        rows_affected: i64,
        execution_ms: i64,
        error: Option<&str>,
    ) -> Result<()> {
        self.write(|tx| {
            let changed = tx.execute(
                "UPDATE model_runs SET status = ?1, rows_affected = ?2, execution_ms = ?3, \
                 error = ?4 WHERE id = ?5",
                params![status.as_str(), rows_affected, execution_ms, error, model_run_id],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("model run", model_run_id.to_string()));
            }
            Ok(())
        })
    }

    pub fn list_model_runs(&self, run_id: i64) -> Result<Vec<ModelRun>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, run_id, model_id, status, rows_affected, execution_ms, error \
                 FROM model_runs WHERE run_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map([run_id], row_to_model_run)?;
            let mut runs = Vec::new();
            for row in rows {
                runs.push(row??);
            }
            Ok(runs)
        })
    }

    /// The newest run record for a model, across all runs.
    pub fn latest_model_run(&self, model_id: i64) -> Result<Option<ModelRun>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, run_id, model_id, status, rows_affected, execution_ms, error \
                 FROM model_runs WHERE model_id = ?1 ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query_map([model_id], row_to_model_run)?;
            match rows.next() {
                Some(row) => Ok(Some(row??)),
                None => Ok(None),
            }
        })
    }
}

fn row_to_environment(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        name: row.get(0)?,
        commit_ref: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn run_query(predicate: &str) -> String {
    format!(
        "SELECT id, environment, status, started_at, completed_at, error FROM runs \
         WHERE {predicate}"
    )
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<Result<Run>> {
    let status_raw: String = row.get(2)?;
    let Some(status) = RunStatus::from_str_opt(&status_raw) else {
        return Ok(Err(StoreError::corrupt(format!(
            "unknown run status `{status_raw}`"
        ))));
    };
    Ok(Ok(Run {
        id: row.get(0)?,
        environment: row.get(1)?,
        status,
        started_at: row.get(3)?,
        completed_at: row.get(4)?,
        error: row.get(5)?,
    }))
}

fn row_to_model_run(row: &Row<'_>) -> rusqlite::Result<Result<ModelRun>> {
    let status_raw: String = row.get(3)?;
    let Some(status) = ModelRunStatus::from_str_opt(&status_raw) else {
        return Ok(Err(StoreError::corrupt(format!(
            "unknown model run status `{status_raw}`"
        ))));
    };
    Ok(Ok(ModelRun {
        id: row.get(0)?,
        run_id: row.get(1)?,
        model_id: row.get(2)?,
        status,
        rows_affected: row.get(4)?,
        execution_ms: row.get(5)?,
        error: row.get(6)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewModel;

    fn register(store: &Store, path: &str) -> i64 {
        store
            .register_model(&NewModel {
                path: path.into(),
                name: path.into(),
                file_path: format!("models/{path}.sql"),
                content_hash: "h".into(),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    #[test]
    fn environment_create_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let first = store.create_environment("dev").unwrap();
        let second = store.create_environment("dev").unwrap();
        assert_eq!(first, second);
        store.set_environment_commit("dev", "abc123").unwrap();
        assert_eq!(
            store.get_environment("dev").unwrap().commit_ref.as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn run_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let run = store.create_run("dev").unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        store
            .finish_run(run.id, RunStatus::Failed, Some("boom"))
            .unwrap();
        let finished = store.get_run(run.id).unwrap();
        assert_eq!(finished.status, RunStatus::Failed);
        assert_eq!(finished.error.as_deref(), Some("boom"));
        assert!(finished.completed_at.is_some());
    }

    #[test]
    fn model_run_accounting() {
        let store = Store::open_in_memory().unwrap();
        let model = register(&store, "m");
        let run = store.create_run("dev").unwrap();
        let model_run = store.start_model_run(run.id, model).unwrap();
        store
            .finish_model_run(model_run, ModelRunStatus::Success, 42, 120, None)
            .unwrap();

        let runs = store.list_model_runs(run.id).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, ModelRunStatus::Success);
        assert_eq!(runs[0].rows_affected, 42);
        assert_eq!(runs[0].execution_ms, 120);

        let latest = store.latest_model_run(model).unwrap().unwrap();
        assert_eq!(latest.id, model_run);
    }

    #[test]
    fn skipped_models_are_recorded() {
        let store = Store::open_in_memory().unwrap();
        let model = register(&store, "m");
        let run = store.create_run("dev").unwrap();
        store.record_model_run_skipped(run.id, model).unwrap();
        let runs = store.list_model_runs(run.id).unwrap();
        assert_eq!(runs[0].status, ModelRunStatus::Skipped);
    }

    #[test]
    fn list_runs_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let first = store.create_run("dev").unwrap();
        let second = store.create_run("dev").unwrap();
        let runs = store.list_runs(10).unwrap();
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[1].id, first.id);
    }
}
