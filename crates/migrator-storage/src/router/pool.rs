//! Pattern-driven fan-out across the src and dst stores.

use std::sync::Arc;

use migrator_core::{
    ConnPool, MigratorResult, Pattern, Rows, Side, StorageError, StorageResult, Transaction,
    TxOptions,
};
use rusqlite::types::Value;
use tracing::{info, warn};

use super::failure::{LoggingFailureHandler, SecondaryFailure, SecondaryFailureHandler, SecondaryOp};
use super::state::RouterState;
use super::tx::DoubleWriteTx;

/// A `ConnPool` over two stores.
///
/// Every call snapshots the pattern once at entry, so a concurrent
/// `change_pattern` only affects calls that start afterwards.
pub struct DoubleWritePool {
    state: Arc<RouterState>,
    src: Arc<dyn ConnPool>,
    dst: Arc<dyn ConnPool>,
    failures: Arc<dyn SecondaryFailureHandler>,
}

impl DoubleWritePool {
    /// Starts in `src_only` with the logging failure handler.
    pub fn new(src: Arc<dyn ConnPool>, dst: Arc<dyn ConnPool>) -> Self {
        Self {
            state: Arc::new(RouterState::default()),
            src,
            dst,
            failures: Arc::new(LoggingFailureHandler::new()),
        }
    }

    /// Share an externally owned `RouterState`.
    pub fn with_state(mut self, state: Arc<RouterState>) -> Self {
        self.state = state;
        self
    }

    pub fn with_failure_handler(mut self, handler: Arc<dyn SecondaryFailureHandler>) -> Self {
        self.failures = handler;
        self
    }

    pub fn state(&self) -> &Arc<RouterState> {
        &self.state
    }

    pub fn pattern(&self) -> Pattern {
        self.state.load()
    }

    /// Switch the pattern for all subsequent calls. Returns the previous one.
    pub fn change_pattern(&self, pattern: Pattern) -> Pattern {
        let previous = self.state.store(pattern);
        if previous != pattern {
            info!(from = %previous, to = %pattern, "double-write pattern changed");
        }
        previous
    }

    /// Like `change_pattern`, from a wire name. An unknown name leaves the
    /// active pattern untouched.
    pub fn change_pattern_named(&self, name: &str) -> MigratorResult<Pattern> {
        let pattern: Pattern = name.parse()?;
        Ok(self.change_pattern(pattern))
    }

    pub fn side(&self, side: Side) -> &Arc<dyn ConnPool> {
        match side {
            Side::Src => &self.src,
            Side::Dst => &self.dst,
        }
    }

    fn report(&self, pattern: Pattern, side: Side, sql: &str, error: &StorageError) {
        self.failures.on_secondary_failure(&SecondaryFailure {
            pattern,
            side,
            op: SecondaryOp::Execute,
            sql: Some(sql),
            error,
        });
    }
}

impl ConnPool for DoubleWritePool {
    fn execute(&self, sql: &str, args: &[Value]) -> StorageResult<usize> {
        let pattern = self.state.load();
        // Primary failure: the secondary is never attempted.
        let affected = self.side(pattern.primary()).execute(sql, args)?;
        if let Some(secondary) = pattern.secondary() {
            if let Err(e) = self.side(secondary).execute(sql, args) {
                self.report(pattern, secondary, sql, &e);
            }
        }
        Ok(affected)
    }

    /// Reads only ever hit the primary side.
    fn query(&self, sql: &str, args: &[Value]) -> StorageResult<Rows> {
        let pattern = self.state.load();
        self.side(pattern.primary()).query(sql, args)
    }

    fn begin(&self, opts: TxOptions) -> StorageResult<Box<dyn Transaction>> {
        let pattern = self.state.load();
        let primary = self.side(pattern.primary()).begin(opts)?;
        let secondary = match pattern.secondary() {
            None => None,
            Some(side) => match self.side(side).begin(opts) {
                Ok(tx) => Some((side, tx)),
                Err(e) => {
                    if let Err(rollback_err) = primary.rollback() {
                        warn!(
                            pattern = %pattern,
                            error = %rollback_err,
                            "rollback of primary after secondary begin failure failed"
                        );
                    }
                    return Err(StorageError::SecondaryBegin {
                        side,
                        source: Box::new(e),
                    });
                }
            },
        };
        Ok(Box::new(DoubleWriteTx::new(
            pattern,
            primary,
            secondary,
            Arc::clone(&self.failures),
        )))
    }
}
