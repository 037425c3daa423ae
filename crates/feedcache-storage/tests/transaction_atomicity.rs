use std::fs::OpenOptions;
use std::path::Path;

use feedcache_storage::{
    Database, EntrySet, SchemaDefinition, StorageConfig, StorageError, Value, WriteMode,
};
use nix::fcntl::{Flock, FlockArg};
use rusqlite::Connection;

struct EventSchema;

impl SchemaDefinition for EventSchema {
    fn create_tables(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
              id TEXT PRIMARY KEY,
              summary TEXT,
              start INTEGER
            );
            "#,
        )
    }

    fn drop_tables(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch("DROP TABLE IF EXISTS events;")
    }
}

fn open_events(root: &Path) -> Database {
    let config = StorageConfig::with_root(root);
    let db = Database::open(&config, "caldav", "events", "caldav.db", 1, &EventSchema);
    assert!(db.is_valid());
    db
}

fn one_event(id: &str) -> EntrySet {
    let mut entries = EntrySet::new();
    entries.set_list("id", vec![id.into()]);
    entries.set_list("summary", vec!["standup".into()]);
    entries.set_list("start", vec![9_i64.into()]);
    entries
}

fn sidecar_is_free(db_path: &Path) -> bool {
    let mut lock_path = db_path.as_os_str().to_os_string();
    lock_path.push(".lock");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .expect("open sidecar");
    Flock::lock(file, FlockArg::LockExclusiveNonblock).is_ok()
}

#[test]
fn dropping_mid_transaction_discards_the_batch() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut db = open_events(dir.path());
    db.begin_transaction().expect("begin");
    db.write(
        "events",
        &["id", "summary", "start"],
        &one_event("e1"),
        WriteMode::Insert,
    )
    .expect("insert");
    // Simulated crash: the handle goes away without a commit.
    drop(db);

    let db = open_events(dir.path());
    let rows = db.query_rows("SELECT id FROM events", &[]).expect("select");
    assert!(rows.is_empty(), "uncommitted batch must not be visible");
}

#[test]
fn rollback_discards_and_commit_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut db = open_events(dir.path());

    db.begin_transaction().expect("begin");
    db.write(
        "events",
        &["id", "summary", "start"],
        &one_event("e1"),
        WriteMode::Insert,
    )
    .expect("insert");
    db.rollback_transaction().expect("rollback");
    assert!(db
        .query_rows("SELECT id FROM events", &[])
        .expect("select")
        .is_empty());

    db.begin_transaction().expect("begin");
    db.write(
        "events",
        &["id", "summary", "start"],
        &one_event("e2"),
        WriteMode::Insert,
    )
    .expect("insert");
    db.commit_transaction().expect("commit");

    let rows = db.query_rows("SELECT id FROM events", &[]).expect("select");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Text("e2".into())));
}

#[test]
fn lock_is_held_for_the_whole_transaction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut db = open_events(dir.path());
    let db_path = db.path().to_path_buf();

    assert!(sidecar_is_free(&db_path));

    db.begin_transaction().expect("begin");
    assert!(
        !sidecar_is_free(&db_path),
        "another process must not acquire the lock mid-batch"
    );
    db.write(
        "events",
        &["id", "summary", "start"],
        &one_event("e1"),
        WriteMode::Insert,
    )
    .expect("insert");
    assert!(!sidecar_is_free(&db_path));

    db.commit_transaction().expect("commit");
    assert!(sidecar_is_free(&db_path), "commit must release the lock");

    db.begin_transaction().expect("begin");
    assert!(!sidecar_is_free(&db_path));
    db.rollback_transaction().expect("rollback");
    assert!(sidecar_is_free(&db_path), "rollback must release the lock");
}

#[test]
fn failed_write_leaves_rollback_to_the_caller() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut db = open_events(dir.path());

    db.begin_transaction().expect("begin");
    db.write(
        "events",
        &["id", "summary", "start"],
        &one_event("e1"),
        WriteMode::Insert,
    )
    .expect("insert");

    // Same primary key again: plain INSERT fails mid-batch.
    let result = db.write(
        "events",
        &["id", "summary", "start"],
        &one_event("e1"),
        WriteMode::Insert,
    );
    assert!(matches!(result, Err(StorageError::Sqlite(_))));

    // The engine did not roll back on its own; the caller does.
    db.rollback_transaction().expect("rollback");
    assert!(db
        .query_rows("SELECT id FROM events", &[])
        .expect("select")
        .is_empty());
}
