//! SQLite PRAGMA configuration applied to every store connection.

use migrator_core::StorageResult;
use rusqlite::Connection;

/// WAL for concurrent readers during writes, `busy_timeout` as the primary
/// contention mechanism.
pub fn configure_connection(conn: &Connection, busy_timeout_ms: u64) -> StorageResult<()> {
    conn.execute_batch(&format!(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = {busy_timeout_ms};
        PRAGMA cache_size = -8000;
        PRAGMA temp_store = MEMORY;
        "
    ))?;
    Ok(())
}

/// Same as `configure_connection` plus `query_only = ON`.
pub fn configure_readonly_connection(conn: &Connection, busy_timeout_ms: u64) -> StorageResult<()> {
    conn.execute_batch(&format!(
        "
        PRAGMA busy_timeout = {busy_timeout_ms};
        PRAGMA cache_size = -8000;
        PRAGMA temp_store = MEMORY;
        PRAGMA query_only = ON;
        "
    ))?;
    Ok(())
}
