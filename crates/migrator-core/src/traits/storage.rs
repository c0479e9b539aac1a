//! Storage connection contract shared by the real stores and the router.
//!
//! Arguments and cells are `rusqlite::types::Value` so the same SQL text can
//! be replayed verbatim against either side of a dual write.

use std::sync::Arc;

use rusqlite::types::{FromSql, Value, ValueRef};

use crate::errors::{StorageError, StorageResult};

/// Options for opening a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Open the transaction without taking the write lock up front.
    pub read_only: bool,
}

/// A connection-pool-like handle that can execute, query and begin transactions.
///
/// Implementations must be safe for concurrent use by many callers.
pub trait ConnPool: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    fn execute(&self, sql: &str, args: &[Value]) -> StorageResult<usize>;

    /// Run a query and materialize all rows.
    fn query(&self, sql: &str, args: &[Value]) -> StorageResult<Rows>;

    /// Open a transaction.
    fn begin(&self, opts: TxOptions) -> StorageResult<Box<dyn Transaction>>;
}

/// An open transaction. Dropping it without `commit` rolls it back.
pub trait Transaction: Send {
    fn execute(&self, sql: &str, args: &[Value]) -> StorageResult<usize>;

    fn query(&self, sql: &str, args: &[Value]) -> StorageResult<Rows>;

    fn commit(self: Box<Self>) -> StorageResult<()>;

    fn rollback(self: Box<Self>) -> StorageResult<()>;
}

impl<T: ConnPool + ?Sized> ConnPool for Arc<T> {
    fn execute(&self, sql: &str, args: &[Value]) -> StorageResult<usize> {
        (**self).execute(sql, args)
    }
    fn query(&self, sql: &str, args: &[Value]) -> StorageResult<Rows> {
        (**self).query(sql, args)
    }
    fn begin(&self, opts: TxOptions) -> StorageResult<Box<dyn Transaction>> {
        (**self).begin(opts)
    }
}

/// Fully materialized result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
        }
    }

    /// Column names, available even when no row matched.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|values| RowRef {
            columns: &self.columns,
            values,
        })
    }

    pub fn first(&self) -> Option<RowRef<'_>> {
        self.iter().next()
    }
}

/// Borrowed view of a single row.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    /// Raw cell by column name.
    pub fn value(&self, column: &str) -> StorageResult<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| StorageError::decode(column, "no such column in result set"))
    }

    /// Typed cell by column name.
    pub fn get<T: FromSql>(&self, column: &str) -> StorageResult<T> {
        let value = self.value(column)?;
        T::column_result(ValueRef::from(value)).map_err(|e| StorageError::decode(column, e))
    }

    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Rows {
        Rows::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Integer(1), Value::Text("a".into())],
                vec![Value::Integer(2), Value::Null],
            ],
        )
    }

    #[test]
    fn typed_get_by_name() {
        let rows = sample();
        let first = rows.first().unwrap();
        assert_eq!(first.get::<i64>("id").unwrap(), 1);
        assert_eq!(first.get::<String>("NAME").unwrap(), "a");
        let second = rows.iter().nth(1).unwrap();
        assert_eq!(second.get::<Option<String>>("name").unwrap(), None);
    }

    #[test]
    fn missing_column_is_decode_error() {
        let rows = sample();
        let err = rows.first().unwrap().get::<i64>("utime").unwrap_err();
        assert!(matches!(err, StorageError::Decode { ref column, .. } if column == "utime"));
    }

    #[test]
    fn type_mismatch_is_decode_error() {
        let rows = sample();
        assert!(rows.first().unwrap().get::<i64>("name").is_err());
    }
}
