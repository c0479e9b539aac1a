//! Transactions on a dedicated SQLite connection.

use migrator_core::{Rows, StorageResult, Transaction};
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::warn;

/// A transaction owning its own connection, so it can outlive the call
/// that opened it without holding the store's writer lock.
pub struct SqliteTx {
    conn: Connection,
    finished: bool,
}

impl SqliteTx {
    pub(crate) fn begin(conn: Connection, read_only: bool) -> StorageResult<Self> {
        conn.execute_batch(if read_only { "BEGIN DEFERRED" } else { "BEGIN IMMEDIATE" })?;
        Ok(Self {
            conn,
            finished: false,
        })
    }
}

impl Transaction for SqliteTx {
    fn execute(&self, sql: &str, args: &[Value]) -> StorageResult<usize> {
        super::execute_on(&self.conn, sql, args)
    }

    fn query(&self, sql: &str, args: &[Value]) -> StorageResult<Rows> {
        super::query_on(&self.conn, sql, args)
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.finished = true;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            // A failed COMMIT leaves the transaction open.
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}
