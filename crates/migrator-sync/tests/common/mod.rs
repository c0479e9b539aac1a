//! Shared fixtures: an interaction-counter entity, file-backed stores and a
//! recording producer.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use migrator_core::config::StorageConfig;
use migrator_core::{
    ConnPool, Entity, InconsistentEvent, InconsistentEventType, MigratorError, MigratorResult,
    Producer, RowRef, StorageResult,
};
use migrator_storage::SqliteStore;
use rusqlite::types::Value;
use tempfile::TempDir;

pub const SCHEMA: &str = "CREATE TABLE interactives (
    id INTEGER PRIMARY KEY,
    biz_id INTEGER NOT NULL,
    biz TEXT NOT NULL,
    read_cnt INTEGER NOT NULL DEFAULT 0,
    like_cnt INTEGER NOT NULL DEFAULT 0,
    collect_cnt INTEGER NOT NULL DEFAULT 0,
    ctime INTEGER NOT NULL,
    utime INTEGER NOT NULL
)";

/// Per-article interaction counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interactive {
    pub id: i64,
    pub biz_id: i64,
    pub biz: String,
    pub read_cnt: i64,
    pub like_cnt: i64,
    pub collect_cnt: i64,
    pub ctime: i64,
    pub utime: i64,
}

impl Interactive {
    pub fn sample(id: i64) -> Self {
        Self {
            id,
            biz_id: id * 7,
            biz: "article".to_string(),
            read_cnt: id * 3,
            like_cnt: id,
            collect_cnt: id % 5,
            ctime: 1_000 + id,
            utime: 1_000 + id,
        }
    }
}

impl Entity for Interactive {
    const TABLE: &'static str = "interactives";

    fn id(&self) -> i64 {
        self.id
    }

    fn utime(&self) -> i64 {
        self.utime
    }

    fn compare_to(&self, other: &Self) -> bool {
        self.id == other.id
            && self.biz_id == other.biz_id
            && self.biz == other.biz
            && self.read_cnt == other.read_cnt
            && self.like_cnt == other.like_cnt
            && self.collect_cnt == other.collect_cnt
    }

    fn from_row(row: &RowRef<'_>) -> StorageResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            biz_id: row.get("biz_id")?,
            biz: row.get("biz")?,
            read_cnt: row.get("read_cnt")?,
            like_cnt: row.get("like_cnt")?,
            collect_cnt: row.get("collect_cnt")?,
            ctime: row.get("ctime")?,
            utime: row.get("utime")?,
        })
    }

    fn to_columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::Integer(self.id)),
            ("biz_id", Value::Integer(self.biz_id)),
            ("biz", Value::Text(self.biz.clone())),
            ("read_cnt", Value::Integer(self.read_cnt)),
            ("like_cnt", Value::Integer(self.like_cnt)),
            ("collect_cnt", Value::Integer(self.collect_cnt)),
            ("ctime", Value::Integer(self.ctime)),
            ("utime", Value::Integer(self.utime)),
        ]
    }
}

pub fn open_store(dir: &TempDir, name: &str) -> Arc<SqliteStore> {
    open_store_with(dir, name, Some(SCHEMA))
}

pub fn open_store_with(dir: &TempDir, name: &str, schema: Option<&str>) -> Arc<SqliteStore> {
    let store = SqliteStore::open(&dir.path().join(name), &StorageConfig::default()).unwrap();
    if let Some(schema) = schema {
        store.execute_batch(schema).unwrap();
    }
    Arc::new(store)
}

pub fn put(store: &(impl ConnPool + ?Sized), row: &Interactive) {
    let columns = row.to_columns();
    let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let args: Vec<Value> = columns.into_iter().map(|(_, value)| value).collect();
    store
        .execute(
            &format!(
                "INSERT OR REPLACE INTO interactives ({}) VALUES ({})",
                names.join(", "),
                placeholders.join(", ")
            ),
            &args,
        )
        .unwrap();
}

pub fn get(store: &(impl ConnPool + ?Sized), id: i64) -> Option<Interactive> {
    let rows = store
        .query("SELECT * FROM interactives WHERE id = ?1", &[Value::Integer(id)])
        .unwrap();
    rows.first().map(|row| Interactive::from_row(&row).unwrap())
}

pub fn all(store: &(impl ConnPool + ?Sized)) -> Vec<Interactive> {
    let rows = store
        .query("SELECT * FROM interactives ORDER BY id", &[])
        .unwrap();
    rows.iter().map(|row| Interactive::from_row(&row).unwrap()).collect()
}

#[derive(Default)]
pub struct RecordingProducer {
    events: Mutex<Vec<InconsistentEvent>>,
}

impl RecordingProducer {
    pub fn events(&self) -> Vec<InconsistentEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn ids(&self, kind: InconsistentEventType) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Producer for RecordingProducer {
    fn publish(&self, event: &InconsistentEvent) -> MigratorResult<()> {
        self.events.lock().unwrap().push(*event);
        Ok(())
    }
}

pub struct FailingProducer;

impl Producer for FailingProducer {
    fn publish(&self, _event: &InconsistentEvent) -> MigratorResult<()> {
        Err(MigratorError::queue("unavailable"))
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}
