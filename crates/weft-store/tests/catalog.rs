//! Whole-store scenarios across domains.

use weft_core::lineage::{ColumnInfo, ColumnSource, Transform};
use weft_store::{ModelRunStatus, NewModel, RunStatus, Store, StoreError};

fn model(path: &str) -> NewModel {
    NewModel {
        path: path.into(),
        name: path.rsplit('.').next().unwrap_or(path).into(),
        file_path: format!("models/{}.sql", path.replace('.', "/")),
        content_hash: format!("hash-{path}"),
        sql_content: format!("SELECT 1 -- {path}"),
        ..Default::default()
    }
}

fn direct(name: &str, table: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.into(),
        index: 0,
        transform: Transform::Direct,
        function: String::new(),
        sources: vec![ColumnSource {
            table: table.into(),
            column: name.into(),
        }],
    }
}

#[test]
fn columns_and_lineage_round_trip_exactly() {
    let store = Store::open_in_memory().unwrap();
    store.register_model(&model("staging.users")).unwrap();

    let mut columns = vec![direct("id", "raw.users"), direct("email", "raw.users")];
    columns[1].index = 1;
    store.save_model_columns("staging.users", &columns).unwrap();

    let read_back = store.get_model_columns("staging.users").unwrap();
    assert_eq!(read_back, columns);
}

#[test]
fn batch_columns_equal_pointwise_reads_for_every_model() {
    let store = Store::open_in_memory().unwrap();
    for (i, path) in ["a", "b", "c"].iter().enumerate() {
        store.register_model(&model(path)).unwrap();
        let mut columns = vec![direct("id", "raw.src")];
        if i > 0 {
            let mut extra = direct("other", "raw.src2");
            extra.index = 1;
            columns.push(extra);
        }
        store.save_model_columns(path, &columns).unwrap();
    }

    let batch = store.batch_get_all_columns().unwrap();
    for path in ["a", "b", "c"] {
        assert_eq!(batch[path], store.get_model_columns(path).unwrap());
    }
}

#[test]
fn model_deletion_cascades_everything() {
    let store = Store::open_in_memory().unwrap();
    let parent = store.register_model(&model("staging.users")).unwrap();
    let child = store.register_model(&model("marts.enriched")).unwrap();
    store.set_dependencies(child.id, &[parent.id]).unwrap();
    store
        .save_model_columns("staging.users", &[direct("id", "raw.users")])
        .unwrap();
    let run = store.create_run("dev").unwrap();
    let model_run = store.start_model_run(run.id, parent.id).unwrap();
    store
        .finish_model_run(model_run, ModelRunStatus::Success, 1, 5, None)
        .unwrap();

    store
        .delete_models_by_file_path("models/staging/users.sql")
        .unwrap();

    assert!(store.get_model_by_path("staging.users").is_err());
    assert!(store.get_model_columns("staging.users").unwrap().is_empty());
    assert!(store.get_parents(child.id).unwrap().is_empty());
    assert!(store.list_model_runs(run.id).unwrap().is_empty());
}

#[test]
fn full_run_bookkeeping_flow() {
    let store = Store::open_in_memory().unwrap();
    let a = store.register_model(&model("a")).unwrap();
    let b = store.register_model(&model("b")).unwrap();
    store.set_dependencies(b.id, &[a.id]).unwrap();
    store.create_environment("dev").unwrap();

    let run = store.create_run("dev").unwrap();
    let a_run = store.start_model_run(run.id, a.id).unwrap();
    store
        .finish_model_run(a_run, ModelRunStatus::Failed, 0, 3, Some("boom"))
        .unwrap();
    store.record_model_run_skipped(run.id, b.id).unwrap();
    store
        .finish_run(run.id, RunStatus::Failed, Some("model a failed"))
        .unwrap();

    let model_runs = store.list_model_runs(run.id).unwrap();
    assert_eq!(model_runs.len(), 2);
    assert_eq!(model_runs[0].status, ModelRunStatus::Failed);
    assert_eq!(model_runs[1].status, ModelRunStatus::Skipped);
    assert_eq!(store.get_run(run.id).unwrap().status, RunStatus::Failed);
}

#[test]
fn closed_store_rejects_every_operation() {
    let store = Store::open_in_memory().unwrap();
    store.register_model(&model("a")).unwrap();
    store.close();
    assert_eq!(store.list_models().unwrap_err(), StoreError::NotOpen);
    assert_eq!(
        store.register_model(&model("b")).unwrap_err(),
        StoreError::NotOpen
    );
    assert_eq!(
        store.batch_get_all_dependencies().unwrap_err(),
        StoreError::NotOpen
    );
}
