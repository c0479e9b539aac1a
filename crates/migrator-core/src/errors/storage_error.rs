//! Storage-layer errors for backend operations.

use rusqlite::ffi::ErrorCode;

use super::error_code::{self, MigratorErrorCode};
use crate::types::Side;

/// Errors that can occur talking to one of the two stores.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("Database busy (another operation in progress)")]
    DbBusy,

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Schema mismatch: {message}")]
    SchemaMismatch { message: String },

    #[error("Failed to decode column {column}: {message}")]
    Decode { column: String, message: String },

    #[error("Operation not supported: {operation} ({reason})")]
    NotSupported { operation: String, reason: String },

    #[error("Secondary transaction on {side} failed to open: {source}")]
    SecondaryBegin {
        side: Side,
        #[source]
        source: Box<StorageError>,
    },

    #[error("{what} lock poisoned")]
    LockPoisoned { what: String },
}

impl StorageError {
    /// Whether retrying the same call later may succeed.
    ///
    /// Only contention and an unreachable store heal by themselves. Statement
    /// errors (constraint, syntax, too many variables), decode failures,
    /// schema mismatches and unsupported operations fail again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DbBusy | Self::Unavailable { .. } => true,
            Self::SecondaryBegin { source, .. } => source.is_transient(),
            Self::Sqlite { .. }
            | Self::SchemaMismatch { .. }
            | Self::Decode { .. }
            | Self::NotSupported { .. }
            | Self::LockPoisoned { .. } => false,
        }
    }

    pub fn decode(column: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = e {
            match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => return Self::DbBusy,
                ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::NotADatabase => {
                    return Self::Unavailable {
                        message: e.to_string(),
                    }
                }
                _ => {}
            }
        }
        let message = e.to_string();
        if message.contains("no such table")
            || message.contains("no such column")
            || message.contains("has no column named")
        {
            Self::SchemaMismatch { message }
        } else {
            Self::Sqlite { message }
        }
    }
}

impl MigratorErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DbBusy => error_code::DB_BUSY,
            Self::Unavailable { .. } => error_code::STORE_UNAVAILABLE,
            Self::SchemaMismatch { .. } => error_code::SCHEMA_MISMATCH,
            Self::Decode { .. } => error_code::DECODE_ERROR,
            Self::NotSupported { .. } => error_code::NOT_SUPPORTED,
            Self::SecondaryBegin { .. } => error_code::SECONDARY_BEGIN_FAILED,
            Self::LockPoisoned { .. } => error_code::LOCK_POISONED,
            Self::Sqlite { .. } => error_code::STORAGE_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_table_maps_to_schema_mismatch() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: StorageError = conn.execute("DELETE FROM nowhere", []).unwrap_err().into();
        assert!(matches!(err, StorageError::SchemaMismatch { .. }), "got {err:?}");
        assert!(!err.is_transient());
        assert_eq!(err.error_code(), error_code::SCHEMA_MISMATCH);
    }

    #[test]
    fn busy_is_transient() {
        assert!(StorageError::DbBusy.is_transient());
        let wrapped = StorageError::SecondaryBegin {
            side: Side::Dst,
            source: Box::new(StorageError::DbBusy),
        };
        assert!(wrapped.is_transient());
    }

    #[test]
    fn statement_errors_are_not_transient() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        conn.execute("INSERT INTO t (id) VALUES (1)", []).unwrap();

        let constraint: StorageError = conn
            .execute("INSERT INTO t (id) VALUES (1)", [])
            .unwrap_err()
            .into();
        assert!(matches!(constraint, StorageError::Sqlite { .. }), "got {constraint:?}");
        assert!(!constraint.is_transient());

        let syntax: StorageError = conn.execute("SELEC 1", []).unwrap_err().into();
        assert!(!syntax.is_transient());

        let placeholders: Vec<String> = (1..=40_000).map(|i| format!("?{i}")).collect();
        let too_many: StorageError = conn
            .prepare(&format!("SELECT id FROM t WHERE id IN ({})", placeholders.join(", ")))
            .unwrap_err()
            .into();
        assert!(!too_many.is_transient());
    }
}
