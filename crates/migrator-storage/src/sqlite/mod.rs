//! SQLite implementation of the storage connection contract.

pub mod pool;
pub mod pragmas;
pub mod transaction;

pub use pool::SqliteStore;
pub use pragmas::{configure_connection, configure_readonly_connection};
pub use transaction::SqliteTx;

use migrator_core::{Rows, StorageResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

pub(crate) fn execute_on(conn: &Connection, sql: &str, args: &[Value]) -> StorageResult<usize> {
    Ok(conn.execute(sql, params_from_iter(args.iter()))?)
}

pub(crate) fn query_on(conn: &Connection, sql: &str, args: &[Value]) -> StorageResult<Rows> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut out = Vec::new();
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(row.get::<_, Value>(i)?);
        }
        out.push(values);
    }
    Ok(Rows::new(columns, out))
}
