//! File-backed SQLite store tests, alone and behind the dual-write router.

use std::sync::Arc;

use migrator_core::config::StorageConfig;
use migrator_core::{ConnPool, Pattern, TxOptions};
use migrator_storage::{DoubleWritePool, LoggingFailureHandler, SqliteStore};
use rusqlite::types::Value;
use tempfile::TempDir;

const SCHEMA: &str = "CREATE TABLE interactive (id INTEGER PRIMARY KEY, like_cnt INTEGER NOT NULL, utime INTEGER NOT NULL)";

fn open(dir: &TempDir, name: &str, schema: bool) -> Arc<SqliteStore> {
    let store = SqliteStore::open(&dir.path().join(name), &StorageConfig::default()).unwrap();
    if schema {
        store.execute_batch(SCHEMA).unwrap();
    }
    Arc::new(store)
}

fn count(store: &SqliteStore) -> i64 {
    store
        .query("SELECT COUNT(*) AS n FROM interactive", &[])
        .unwrap()
        .first()
        .unwrap()
        .get::<i64>("n")
        .unwrap()
}

fn insert_args(id: i64) -> [Value; 3] {
    [Value::Integer(id), Value::Integer(id * 10), Value::Integer(1_000 + id)]
}

const INSERT: &str = "INSERT INTO interactive (id, like_cnt, utime) VALUES (?1, ?2, ?3)";

#[test]
fn writes_are_visible_to_readers() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, "src.db", true);
    for id in 1..=5 {
        assert_eq!(store.execute(INSERT, &insert_args(id)).unwrap(), 1);
    }
    assert_eq!(count(&store), 5);
    assert_eq!(store.path(), Some(dir.path().join("src.db").as_path()));
}

#[test]
fn transaction_commit_persists() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, "src.db", true);
    let tx = store.begin(TxOptions::default()).unwrap();
    tx.execute(INSERT, &insert_args(1)).unwrap();
    tx.execute(INSERT, &insert_args(2)).unwrap();
    let inside = tx.query("SELECT COUNT(*) AS n FROM interactive", &[]).unwrap();
    assert_eq!(inside.first().unwrap().get::<i64>("n").unwrap(), 2);
    tx.commit().unwrap();
    assert_eq!(count(&store), 2);
}

#[test]
fn transaction_rollback_discards() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, "src.db", true);
    let tx = store.begin(TxOptions::default()).unwrap();
    tx.execute(INSERT, &insert_args(1)).unwrap();
    tx.rollback().unwrap();
    assert_eq!(count(&store), 0);
}

#[test]
fn dropped_transaction_rolls_back() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, "src.db", true);
    {
        let tx = store.begin(TxOptions::default()).unwrap();
        tx.execute(INSERT, &insert_args(1)).unwrap();
    }
    assert_eq!(count(&store), 0);
    store.execute(INSERT, &insert_args(1)).unwrap();
    assert_eq!(count(&store), 1);
}

#[test]
fn missing_table_on_secondary_is_reported_not_returned() {
    let dir = TempDir::new().unwrap();
    let src = open(&dir, "src.db", true);
    let dst = open(&dir, "dst.db", false);
    let handler = Arc::new(LoggingFailureHandler::new());
    let pool = DoubleWritePool::new(src.clone(), dst.clone()).with_failure_handler(handler.clone());
    pool.change_pattern(Pattern::SrcFirst);

    assert_eq!(pool.execute(INSERT, &insert_args(1)).unwrap(), 1);
    assert_eq!(count(&src), 1);

    let stats = handler.stats();
    assert_eq!(stats.schema_mismatch, 1);
    assert_eq!(stats.total(), 1);
}

#[test]
fn missing_table_on_primary_is_returned() {
    let dir = TempDir::new().unwrap();
    let src = open(&dir, "src.db", true);
    let dst = open(&dir, "dst.db", false);
    let pool = DoubleWritePool::new(src.clone(), dst);
    pool.change_pattern(Pattern::DstFirst);

    let err = pool.execute(INSERT, &insert_args(1)).unwrap_err();
    assert!(matches!(err, migrator_core::StorageError::SchemaMismatch { .. }));
    assert_eq!(count(&src), 0);
}

#[test]
fn dual_transaction_commits_to_both_stores() {
    let dir = TempDir::new().unwrap();
    let src = open(&dir, "src.db", true);
    let dst = open(&dir, "dst.db", true);
    let pool = DoubleWritePool::new(src.clone(), dst.clone());
    pool.change_pattern(Pattern::SrcFirst);

    let tx = pool.begin(TxOptions::default()).unwrap();
    for id in 1..=3 {
        tx.execute(INSERT, &insert_args(id)).unwrap();
    }
    tx.commit().unwrap();

    assert_eq!(count(&src), 3);
    assert_eq!(count(&dst), 3);
}

#[test]
fn dual_transaction_rollback_discards_both() {
    let dir = TempDir::new().unwrap();
    let src = open(&dir, "src.db", true);
    let dst = open(&dir, "dst.db", true);
    let pool = DoubleWritePool::new(src.clone(), dst.clone());
    pool.change_pattern(Pattern::DstFirst);

    let tx = pool.begin(TxOptions::default()).unwrap();
    tx.execute(INSERT, &insert_args(1)).unwrap();
    tx.rollback().unwrap();

    assert_eq!(count(&src), 0);
    assert_eq!(count(&dst), 0);
}
