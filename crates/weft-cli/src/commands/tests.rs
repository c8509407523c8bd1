//! End-to-end command flows over a temporary project.

use std::fs;
use std::path::Path;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn scaffold() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "weft.yml",
        "models_dir: models\nseeds_dir: seeds\nmacros_dir: macros\ntarget:\n  type: generic\n",
    );
    write(
        dir.path(),
        "models/staging/users.sql",
        "/*---\nname: users\nmaterialized: table\n---*/\nSELECT 1 AS id, 'ada' AS name",
    );
    write(
        dir.path(),
        "models/marts/user_names.sql",
        "/*---\nmaterialized: view\n---*/\nSELECT name FROM \"staging.users\"",
    );
    write(dir.path(), "seeds/countries.csv", "code,name\nnz,New Zealand\n");
    write(
        dir.path(),
        "macros/helpers.py",
        "def shout(s):\n    \"\"\"Uppercases a value.\"\"\"\n    return s\n",
    );
    dir
}

#[test]
fn parse_then_run_then_docs_flow() {
    let dir = scaffold();

    let code = super::parse::run(dir.path()).unwrap();
    assert_eq!(code, 0);

    let store = super::open_store(dir.path()).unwrap();
    assert_eq!(store.list_models().unwrap().len(), 2);
    assert!(store.get_macro_namespace("helpers").is_ok());
    drop(store);

    let code = super::run::run(dir.path(), None, &[], true).unwrap();
    assert_eq!(code, 0);

    let store = super::open_store(dir.path()).unwrap();
    let run = store.list_runs(1).unwrap().remove(0);
    assert_eq!(run.status, weft_store::RunStatus::Completed);
    assert_eq!(store.list_model_runs(run.id).unwrap().len(), 2);
    drop(store);

    let code = super::docs::run(dir.path(), None).unwrap();
    assert_eq!(code, 0);
    let code = super::docs::run(dir.path(), Some("users")).unwrap();
    assert_eq!(code, 0);
}

#[test]
fn lint_reports_and_sets_exit_code() {
    let dir = scaffold();
    // A model with an undeclared alias is an error-severity lint.
    write(
        dir.path(),
        "models/broken.sql",
        "SELECT x.id FROM users u",
    );
    let code = super::lint::run(dir.path()).unwrap();
    assert_eq!(code, 1);
}

#[test]
fn clean_removes_state() {
    let dir = scaffold();
    super::parse::run(dir.path()).unwrap();
    assert!(dir.path().join(".weft").exists());
    let code = super::clean::run(dir.path()).unwrap();
    assert_eq!(code, 0);
    assert!(!dir.path().join(".weft").exists());
}

#[test]
fn run_with_selector_limits_execution() {
    let dir = scaffold();
    super::parse::run(dir.path()).unwrap();
    let code = super::run::run(dir.path(), None, &["staging.users".into()], false).unwrap();
    assert_eq!(code, 0);

    let store = super::open_store(dir.path()).unwrap();
    let run = store.list_runs(1).unwrap().remove(0);
    assert_eq!(store.list_model_runs(run.id).unwrap().len(), 1);
}
