//! Recording `ConnPool` double with switchable failures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use migrator_core::{ConnPool, Rows, StorageError, StorageResult, Transaction, TxOptions};
use rusqlite::types::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Execute(String),
    Query(String),
    Begin,
    TxExecute(String),
    TxQuery(String),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
pub struct Faults {
    pub execute: AtomicBool,
    pub query: AtomicBool,
    pub begin: AtomicBool,
    pub commit: AtomicBool,
    pub rollback: AtomicBool,
}

pub struct FakePool {
    pub name: &'static str,
    affected: usize,
    calls: Arc<Mutex<Vec<Call>>>,
    pub faults: Arc<Faults>,
}

impl FakePool {
    pub fn new(name: &'static str, affected: usize) -> Arc<Self> {
        Arc::new(Self {
            name,
            affected,
            calls: Arc::new(Mutex::new(Vec::new())),
            faults: Arc::new(Faults::default()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn untouched(&self) -> bool {
        self.calls().is_empty()
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn check(name: &str, flag: &AtomicBool) -> StorageResult<()> {
    if flag.load(Ordering::SeqCst) {
        Err(StorageError::Unavailable {
            message: format!("{name} injected failure"),
        })
    } else {
        Ok(())
    }
}

fn side_rows(name: &str) -> Rows {
    Rows::new(vec!["side".to_string()], vec![vec![Value::Text(name.to_string())]])
}

impl ConnPool for FakePool {
    fn execute(&self, sql: &str, _args: &[Value]) -> StorageResult<usize> {
        self.record(Call::Execute(sql.to_string()));
        check(self.name, &self.faults.execute)?;
        Ok(self.affected)
    }

    fn query(&self, sql: &str, _args: &[Value]) -> StorageResult<Rows> {
        self.record(Call::Query(sql.to_string()));
        check(self.name, &self.faults.query)?;
        Ok(side_rows(self.name))
    }

    fn begin(&self, _opts: TxOptions) -> StorageResult<Box<dyn Transaction>> {
        self.record(Call::Begin);
        check(self.name, &self.faults.begin)?;
        Ok(Box::new(FakeTx {
            name: self.name,
            affected: self.affected,
            calls: Arc::clone(&self.calls),
            faults: Arc::clone(&self.faults),
        }))
    }
}

pub struct FakeTx {
    name: &'static str,
    affected: usize,
    calls: Arc<Mutex<Vec<Call>>>,
    faults: Arc<Faults>,
}

impl FakeTx {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Transaction for FakeTx {
    fn execute(&self, sql: &str, _args: &[Value]) -> StorageResult<usize> {
        self.record(Call::TxExecute(sql.to_string()));
        check(self.name, &self.faults.execute)?;
        Ok(self.affected)
    }

    fn query(&self, sql: &str, _args: &[Value]) -> StorageResult<Rows> {
        self.record(Call::TxQuery(sql.to_string()));
        check(self.name, &self.faults.query)?;
        Ok(side_rows(self.name))
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        self.record(Call::Commit);
        check(self.name, &self.faults.commit)
    }

    fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.record(Call::Rollback);
        check(self.name, &self.faults.rollback)
    }
}
