use tempfile::tempdir;

use ftk_core::demo::seed_demo_dataset;
use ftk_core::error::ErrorKind;
use ftk_core::repo::count_incidents;
use ftk_core::workspace::{
    create_workspace, create_workspace_connection, db_is_empty, open_workspace, open_workspace_connection,
};

#[test]
fn workspace_isolation_create_open_switch() {
    let tmp = tempdir().unwrap();
    let w1 = tmp.path().join("w1.sqlite");
    let w2 = tmp.path().join("w2.sqlite");

    let mut conn1 = create_workspace_connection(&w1).expect("create w1");
    seed_demo_dataset(&mut conn1).expect("seed w1");
    assert!(count_incidents(&conn1).unwrap() > 0);

    let conn2 = create_workspace_connection(&w2).expect("create w2");
    assert_eq!(count_incidents(&conn2).unwrap(), 0);
    assert!(db_is_empty(&w2).expect("is_empty"));

    let conn1b = open_workspace_connection(&w1).expect("open w1");
    assert_eq!(count_incidents(&conn1b).unwrap(), 3);
}

#[test]
fn migrations_run_on_open_and_create() {
    let tmp = tempdir().unwrap();
    let w = tmp.path().join("nested").join("migrate.sqlite");

    let meta = create_workspace(&w).expect("create meta");
    assert!(meta.is_empty);

    let meta = open_workspace(&w).expect("reopen");
    assert!(meta.is_empty);
}

#[test]
fn workspace_db_is_empty_reports_correctly() {
    let tmp = tempdir().unwrap();
    let w = tmp.path().join("empty.sqlite");

    let mut conn = create_workspace_connection(&w).expect("create");
    assert!(db_is_empty(&w).expect("empty true"));
    seed_demo_dataset(&mut conn).expect("seed");
    assert!(!db_is_empty(&w).expect("empty false"));
}

#[test]
fn open_and_create_fail_distinctly() {
    let tmp = tempdir().unwrap();
    let missing = tmp.path().join("missing.sqlite");
    let err = open_workspace_connection(&missing).expect_err("missing");
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.code, "WORKSPACE_DB_NOT_FOUND");

    let existing = tmp.path().join("existing.sqlite");
    create_workspace(&existing).expect("create");
    let err = create_workspace(&existing).expect_err("exists");
    assert_eq!(err.code, "WORKSPACE_ALREADY_EXISTS");

    let err = open_workspace_connection(tmp.path()).expect_err("directory");
    assert_eq!(err.code, "WORKSPACE_INVALID_PATH");
}
