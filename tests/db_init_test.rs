//! Database bootstrap over a real file: WAL, schema, migrations, health.

mod helpers;

use engram::db;

#[test]
fn open_database_bootstraps_schema_and_reports_healthy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/dir/memory.db");

    let conn = db::open_database(&path, 384).unwrap();
    assert!(path.exists());

    // WAL mode is on for reader/writer separation.
    let journal_mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");

    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.vector_dim, 384);
    assert_eq!(
        report.schema_version,
        db::migrations::CURRENT_SCHEMA_VERSION
    );
    assert_eq!(report.memory_count, 0);
    assert_eq!(report.sync_event_count, 0);
    assert_eq!(report.secret_count, 0);
    assert!(!report.sqlite_vec_version.is_empty());
}

#[test]
fn reopening_an_existing_database_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.db");

    drop(db::open_database(&path, 384).unwrap());
    let conn = db::open_database(&path, 384).unwrap();

    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
}
