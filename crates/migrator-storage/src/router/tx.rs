//! A primary transaction with an optional secondary.

use std::sync::Arc;

use migrator_core::{Pattern, Rows, Side, StorageError, StorageResult, Transaction};
use rusqlite::types::Value;

use super::failure::{SecondaryFailure, SecondaryFailureHandler, SecondaryOp};

/// Binds the primary and (for `*_first` patterns) secondary transactions
/// for one unit of work. The pattern is fixed when the transaction opens.
pub struct DoubleWriteTx {
    pattern: Pattern,
    primary: Box<dyn Transaction>,
    secondary: Option<(Side, Box<dyn Transaction>)>,
    failures: Arc<dyn SecondaryFailureHandler>,
}

impl DoubleWriteTx {
    pub(crate) fn new(
        pattern: Pattern,
        primary: Box<dyn Transaction>,
        secondary: Option<(Side, Box<dyn Transaction>)>,
        failures: Arc<dyn SecondaryFailureHandler>,
    ) -> Self {
        Self {
            pattern,
            primary,
            secondary,
            failures,
        }
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    fn report(&self, side: Side, op: SecondaryOp, sql: Option<&str>, error: &StorageError) {
        self.failures.on_secondary_failure(&SecondaryFailure {
            pattern: self.pattern,
            side,
            op,
            sql,
            error,
        });
    }
}

impl Transaction for DoubleWriteTx {
    fn execute(&self, sql: &str, args: &[Value]) -> StorageResult<usize> {
        let affected = self.primary.execute(sql, args)?;
        if let Some((side, tx)) = &self.secondary {
            if let Err(e) = tx.execute(sql, args) {
                self.report(*side, SecondaryOp::Execute, Some(sql), &e);
            }
        }
        Ok(affected)
    }

    fn query(&self, sql: &str, args: &[Value]) -> StorageResult<Rows> {
        self.primary.query(sql, args)
    }

    /// Commits the primary; the secondary is committed only if the primary
    /// committed, otherwise it is rolled back.
    fn commit(self: Box<Self>) -> StorageResult<()> {
        let Self {
            pattern,
            primary,
            secondary,
            failures,
        } = *self;
        let result = primary.commit();
        if let Some((side, tx)) = secondary {
            let (op, outcome) = if result.is_ok() {
                (SecondaryOp::Commit, tx.commit())
            } else {
                (SecondaryOp::Rollback, tx.rollback())
            };
            if let Err(e) = outcome {
                failures.on_secondary_failure(&SecondaryFailure {
                    pattern,
                    side,
                    op,
                    sql: None,
                    error: &e,
                });
            }
        }
        result
    }

    fn rollback(self: Box<Self>) -> StorageResult<()> {
        let Self {
            pattern,
            primary,
            secondary,
            failures,
        } = *self;
        let result = primary.rollback();
        if let Some((side, tx)) = secondary {
            if let Err(e) = tx.rollback() {
                failures.on_secondary_failure(&SecondaryFailure {
                    pattern,
                    side,
                    op: SecondaryOp::Rollback,
                    sql: None,
                    error: &e,
                });
            }
        }
        result
    }
}
