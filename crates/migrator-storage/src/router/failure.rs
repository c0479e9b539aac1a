//! What happens when the secondary side of a dual write fails.
//!
//! The secondary may be a freshly provisioned store that is still
//! converging, so its failures never reach the caller. They are classified
//! and handed to a `SecondaryFailureHandler` chosen at construction time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use migrator_core::{Pattern, Side, StorageError};
use tracing::{error, warn};

/// Operational classification of a secondary failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Busy, locked, cannot open, I/O, disk full. Expected to heal by itself.
    Unreachable,
    /// Missing table/column or undecodable data. Needs an operator.
    SchemaMismatch,
    /// The store rejected the statement (constraint, syntax, unsupported),
    /// or the connection lock is poisoned.
    Rejected,
}

impl FailureClass {
    /// `Unreachable` is exactly the set `StorageError::is_transient` accepts.
    pub fn classify(error: &StorageError) -> Self {
        match error {
            StorageError::SecondaryBegin { source, .. } => Self::classify(source),
            e if e.is_transient() => Self::Unreachable,
            StorageError::SchemaMismatch { .. } | StorageError::Decode { .. } => {
                Self::SchemaMismatch
            }
            _ => Self::Rejected,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unreachable => "unreachable",
            Self::SchemaMismatch => "schema_mismatch",
            Self::Rejected => "rejected",
        })
    }
}

/// Which secondary operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryOp {
    Execute,
    Commit,
    Rollback,
}

impl fmt::Display for SecondaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Execute => "execute",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SecondaryFailure<'a> {
    pub pattern: Pattern,
    pub side: Side,
    pub op: SecondaryOp,
    /// Statement text for `Execute`.
    pub sql: Option<&'a str>,
    pub error: &'a StorageError,
}

impl SecondaryFailure<'_> {
    pub fn class(&self) -> FailureClass {
        FailureClass::classify(self.error)
    }
}

/// Strategy for secondary failures. Must not block for long: it runs inline
/// on the caller's write path.
pub trait SecondaryFailureHandler: Send + Sync {
    fn on_secondary_failure(&self, failure: &SecondaryFailure<'_>);
}

impl<F> SecondaryFailureHandler for F
where
    F: Fn(&SecondaryFailure<'_>) + Send + Sync,
{
    fn on_secondary_failure(&self, failure: &SecondaryFailure<'_>) {
        self(failure)
    }
}

/// Counters per failure class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecondaryFailureStats {
    pub unreachable: u64,
    pub schema_mismatch: u64,
    pub rejected: u64,
}

impl SecondaryFailureStats {
    pub fn total(&self) -> u64 {
        self.unreachable + self.schema_mismatch + self.rejected
    }
}

/// Default handler: logs (warn for unreachable, error otherwise) and counts.
#[derive(Debug, Default)]
pub struct LoggingFailureHandler {
    unreachable: AtomicU64,
    schema_mismatch: AtomicU64,
    rejected: AtomicU64,
}

impl LoggingFailureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> SecondaryFailureStats {
        SecondaryFailureStats {
            unreachable: self.unreachable.load(Ordering::Relaxed),
            schema_mismatch: self.schema_mismatch.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl SecondaryFailureHandler for LoggingFailureHandler {
    fn on_secondary_failure(&self, failure: &SecondaryFailure<'_>) {
        let class = failure.class();
        let counter = match class {
            FailureClass::Unreachable => &self.unreachable,
            FailureClass::SchemaMismatch => &self.schema_mismatch,
            FailureClass::Rejected => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        match class {
            FailureClass::Unreachable => warn!(
                pattern = %failure.pattern,
                side = %failure.side,
                op = %failure.op,
                class = %class,
                error = %failure.error,
                "secondary write failed, validator will repair"
            ),
            FailureClass::SchemaMismatch | FailureClass::Rejected => error!(
                pattern = %failure.pattern,
                side = %failure.side,
                op = %failure.op,
                class = %class,
                sql = failure.sql.unwrap_or(""),
                error = %failure.error,
                "secondary write failed"
            ),
        }
    }
}
