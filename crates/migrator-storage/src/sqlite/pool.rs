//! SqliteStore: one writer plus a round-robin read pool.
//!
//! Writes go through the single writer connection, reads rotate over the
//! read-only connections. Transactions get a dedicated connection.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use migrator_core::config::StorageConfig;
use migrator_core::{ConnPool, Rows, StorageError, StorageResult, Transaction, TxOptions};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::pragmas::{configure_connection, configure_readonly_connection};
use super::transaction::SqliteTx;

/// Default number of reader connections.
const DEFAULT_READ_POOL_SIZE: usize = 2;

/// One side of the migration backed by SQLite.
pub struct SqliteStore {
    path: Option<PathBuf>,
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    read_index: AtomicUsize,
    busy_timeout_ms: u64,
}

impl SqliteStore {
    /// Open a file-backed store: 1 writer + `read_pool_size` readers.
    pub fn open(path: &Path, config: &StorageConfig) -> StorageResult<Self> {
        let pool_size = if config.read_pool_size == 0 {
            DEFAULT_READ_POOL_SIZE
        } else {
            config.read_pool_size
        };

        let writer = Connection::open(path).map_err(|e| StorageError::Unavailable {
            message: format!("open writer {}: {e}", path.display()),
        })?;
        configure_connection(&writer, config.busy_timeout_ms)?;

        let mut readers = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let reader = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| StorageError::Unavailable {
                message: format!("open reader {i} {}: {e}", path.display()),
            })?;
            configure_readonly_connection(&reader, config.busy_timeout_ms)?;
            readers.push(Mutex::new(reader));
        }

        debug!(path = %path.display(), readers = pool_size, "sqlite store opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            writer: Mutex::new(writer),
            readers,
            read_index: AtomicUsize::new(0),
            busy_timeout_ms: config.busy_timeout_ms,
        })
    }

    /// Open an in-memory store. Reads share the writer connection and
    /// transactions are not supported.
    pub fn open_in_memory() -> StorageResult<Self> {
        let writer = Connection::open_in_memory().map_err(|e| StorageError::Unavailable {
            message: format!("open in-memory writer: {e}"),
        })?;
        let busy_timeout_ms = StorageConfig::default().busy_timeout_ms;
        configure_connection(&writer, busy_timeout_ms)?;
        Ok(Self {
            path: None,
            writer: Mutex::new(writer),
            readers: Vec::new(),
            read_index: AtomicUsize::new(0),
            busy_timeout_ms,
        })
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a batch of statements on the writer (schema setup, fixtures).
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.with_writer(|conn| Ok(conn.execute_batch(sql)?))
    }

    pub fn with_writer<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let conn = self.writer.lock().map_err(|_| StorageError::LockPoisoned {
            what: "sqlite writer".to_string(),
        })?;
        f(&conn)
    }

    /// Falls back to the writer when there are no readers (in-memory mode).
    pub fn with_reader<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        if self.readers.is_empty() {
            return self.with_writer(f);
        }
        let index = self.read_index.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[index].lock().map_err(|_| StorageError::LockPoisoned {
            what: "sqlite reader".to_string(),
        })?;
        f(&conn)
    }
}

impl ConnPool for SqliteStore {
    fn execute(&self, sql: &str, args: &[Value]) -> StorageResult<usize> {
        self.with_writer(|conn| super::execute_on(conn, sql, args))
    }

    fn query(&self, sql: &str, args: &[Value]) -> StorageResult<Rows> {
        self.with_reader(|conn| super::query_on(conn, sql, args))
    }

    fn begin(&self, opts: TxOptions) -> StorageResult<Box<dyn Transaction>> {
        let path = self.path.as_deref().ok_or_else(|| StorageError::NotSupported {
            operation: "begin".to_string(),
            reason: "in-memory stores have a single connection".to_string(),
        })?;
        let conn = Connection::open(path).map_err(|e| StorageError::Unavailable {
            message: format!("open transaction connection {}: {e}", path.display()),
        })?;
        configure_connection(&conn, self.busy_timeout_ms)?;
        Ok(Box::new(SqliteTx::begin(conn, opts.read_only)?))
    }
}
