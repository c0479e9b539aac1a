//! Bidirectional validator.
//!
//! Two scan loops run side by side for one entity type:
//! - forward (base → target): pages base by `(utime, id)` and reports
//!   `target_missing` / `neq` for ids the target lacks or disagrees on.
//! - reverse (target → base): pages target ids and reports `base_missing`
//!   for ids the base no longer has.
//!
//! Both loops observe the same run-scoped cancellation token. A loop that
//! fails unrecoverably cancels its sibling before returning.

use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use migrator_core::config::ValidationConfig;
use migrator_core::{
    CancellationToken, ConnPool, Entity, FxHashMap, FxHashSet, InconsistentEvent,
    InconsistentEventType, MigratorError, MigratorResult, Producer, Rows, Side, StorageError,
    StorageResult,
};
use rusqlite::types::Value;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Upper bound on bound parameters per statement in the bundled SQLite.
const MAX_LOOKUP_IDS: usize = 32_766;

/// Counters for one validation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub forward_pages: u64,
    pub reverse_pages: u64,
    pub target_missing: u64,
    pub not_equal: u64,
    pub base_missing: u64,
    /// Events the producer refused. They are re-detected on the next pass.
    pub notify_failures: u64,
}

impl ValidationReport {
    pub fn events(&self) -> u64 {
        self.target_missing + self.not_equal + self.base_missing
    }

    fn merge(self, other: Self) -> Self {
        Self {
            forward_pages: self.forward_pages + other.forward_pages,
            reverse_pages: self.reverse_pages + other.reverse_pages,
            target_missing: self.target_missing + other.target_missing,
            not_equal: self.not_equal + other.not_equal,
            base_missing: self.base_missing + other.base_missing,
            notify_failures: self.notify_failures + other.notify_failures,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Scan {
    Forward,
    Reverse,
}

impl Scan {
    fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
        }
    }
}

/// Cancels the run when a scan thread exits with an error or unwinds.
struct CancelOnExit<'a> {
    token: &'a CancellationToken,
    armed: bool,
}

impl Drop for CancelOnExit<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.token.cancel();
        }
    }
}

/// Compares `base` (authoritative) against `target` for entity type `T`.
pub struct Validator<T: Entity> {
    base: Arc<dyn ConnPool>,
    target: Arc<dyn ConnPool>,
    direction: Side,
    producer: Arc<dyn Producer>,
    batch_size: usize,
    utime: i64,
    sleep_interval: Duration,
    error_backoff: Duration,
    max_consecutive_errors: u32,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Validator<T> {
    /// `direction` names the side `base` is; it is stamped on every event.
    pub fn new(
        base: Arc<dyn ConnPool>,
        target: Arc<dyn ConnPool>,
        direction: Side,
        producer: Arc<dyn Producer>,
    ) -> Self {
        Self::from_config(base, target, direction, producer, &ValidationConfig::default())
    }

    pub fn from_config(
        base: Arc<dyn ConnPool>,
        target: Arc<dyn ConnPool>,
        direction: Side,
        producer: Arc<dyn Producer>,
        config: &ValidationConfig,
    ) -> Self {
        Self {
            base,
            target,
            direction,
            producer,
            batch_size: config.batch_size.max(1),
            utime: config.utime,
            sleep_interval: config.sleep_interval(),
            error_backoff: config.error_backoff(),
            max_consecutive_errors: config.max_consecutive_errors,
            _entity: PhantomData,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Lower bound on the update timestamp for the forward scan.
    pub fn utime(mut self, utime: i64) -> Self {
        self.utime = utime;
        self
    }

    /// Zero means a single pass; anything else keeps tailing until cancelled.
    pub fn sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval = interval;
        self
    }

    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    pub fn direction(&self) -> Side {
        self.direction
    }

    fn tailing(&self) -> bool {
        !self.sleep_interval.is_zero()
    }

    /// Run both scans until they finish (single pass) or `token` is cancelled.
    ///
    /// Cancellation is a clean exit and still returns the partial report.
    pub fn validate(&self, token: &CancellationToken) -> MigratorResult<ValidationReport> {
        let run = token.child_token();
        info!(
            table = T::TABLE,
            direction = %self.direction,
            utime = self.utime,
            batch_size = self.batch_size,
            tailing = self.tailing(),
            "validation started"
        );

        let (forward, reverse) = thread::scope(|s| -> MigratorResult<_> {
            let forward = thread::Builder::new()
                .name(format!("{}-validate-fwd", T::TABLE))
                .spawn_scoped(s, || self.guarded(&run, Scan::Forward))
                .map_err(|e| spawn_error(Scan::Forward, e))?;
            let reverse = match thread::Builder::new()
                .name(format!("{}-validate-rev", T::TABLE))
                .spawn_scoped(s, || self.guarded(&run, Scan::Reverse))
            {
                Ok(handle) => handle,
                Err(e) => {
                    run.cancel();
                    return Err(spawn_error(Scan::Reverse, e));
                }
            };
            Ok((join_scan(forward, Scan::Forward), join_scan(reverse, Scan::Reverse)))
        })?;

        let report = forward?.merge(reverse?);
        info!(
            table = T::TABLE,
            direction = %self.direction,
            forward_pages = report.forward_pages,
            reverse_pages = report.reverse_pages,
            target_missing = report.target_missing,
            not_equal = report.not_equal,
            base_missing = report.base_missing,
            notify_failures = report.notify_failures,
            cancelled = token.is_cancelled(),
            "validation finished"
        );
        Ok(report)
    }

    fn guarded(&self, run: &CancellationToken, scan: Scan) -> MigratorResult<ValidationReport> {
        let mut guard = CancelOnExit {
            token: run,
            armed: true,
        };
        let result = match scan {
            Scan::Forward => self.forward(run),
            Scan::Reverse => self.reverse(run),
        };
        guard.armed = result.is_err();
        result
    }

    fn forward(&self, token: &CancellationToken) -> MigratorResult<ValidationReport> {
        let sql = format!(
            "SELECT * FROM {table} WHERE {utime} >= ?1 ORDER BY {utime} ASC, id ASC LIMIT ?2 OFFSET ?3",
            table = T::TABLE,
            utime = T::UTIME_COLUMN,
        );
        let mut report = ValidationReport::default();
        let mut offset = 0usize;
        let mut failures = 0u32;

        while !token.is_cancelled() {
            let args = [
                Value::Integer(self.utime),
                Value::Integer(self.batch_size as i64),
                Value::Integer(offset as i64),
            ];
            let page = match self.base.query(&sql, &args).and_then(|rows| decode::<T>(&rows)) {
                Ok(page) => page,
                Err(e) => match self.back_off(token, Scan::Forward, offset, e, &mut failures)? {
                    true => continue,
                    false => break,
                },
            };
            if page.is_empty() {
                if self.tailing() && token.sleep(self.sleep_interval) {
                    continue;
                }
                break;
            }

            let found = match self.load_targets(&page) {
                Ok(found) => found,
                Err(e) => match self.back_off(token, Scan::Forward, offset, e, &mut failures)? {
                    true => continue,
                    false => break,
                },
            };
            failures = 0;
            if token.is_cancelled() {
                break;
            }

            report.forward_pages += 1;
            for base in &page {
                match found.get(&base.id()) {
                    None => self.notify(base.id(), InconsistentEventType::TargetMissing, &mut report),
                    Some(target) if !base.compare_to(target) => {
                        self.notify(base.id(), InconsistentEventType::NotEqual, &mut report)
                    }
                    Some(_) => {}
                }
            }
            debug!(table = T::TABLE, scan = "forward", offset, rows = page.len(), "page checked");

            if !self.advance(token, &mut offset, page.len()) {
                break;
            }
        }
        Ok(report)
    }

    fn reverse(&self, token: &CancellationToken) -> MigratorResult<ValidationReport> {
        let sql = format!("SELECT id FROM {} ORDER BY id ASC LIMIT ?1 OFFSET ?2", T::TABLE);
        let mut report = ValidationReport::default();
        let mut offset = 0usize;
        let mut failures = 0u32;

        while !token.is_cancelled() {
            let args = [Value::Integer(self.batch_size as i64), Value::Integer(offset as i64)];
            let ids = match self.target.query(&sql, &args).and_then(|rows| ids_of(&rows)) {
                Ok(ids) => ids,
                Err(e) => match self.back_off(token, Scan::Reverse, offset, e, &mut failures)? {
                    true => continue,
                    false => break,
                },
            };
            if ids.is_empty() {
                if self.tailing() && token.sleep(self.sleep_interval) {
                    continue;
                }
                break;
            }

            let present = match self.load_base_ids(&ids) {
                Ok(present) => present,
                Err(e) => match self.back_off(token, Scan::Reverse, offset, e, &mut failures)? {
                    true => continue,
                    false => break,
                },
            };
            failures = 0;
            if token.is_cancelled() {
                break;
            }

            report.reverse_pages += 1;
            for &id in ids.iter().filter(|id| !present.contains(id)) {
                self.notify(id, InconsistentEventType::BaseMissing, &mut report);
            }
            debug!(table = T::TABLE, scan = "reverse", offset, rows = ids.len(), "page checked");

            if !self.advance(token, &mut offset, ids.len()) {
                break;
            }
        }
        Ok(report)
    }

    /// Move past a processed page. Returns `false` when the loop should stop.
    ///
    /// A full page advances by the batch size. A short page ends a single
    /// pass; when tailing, the offset moves past the rows seen and the loop
    /// sleeps before polling again.
    fn advance(&self, token: &CancellationToken, offset: &mut usize, rows: usize) -> bool {
        if rows >= self.batch_size {
            *offset += self.batch_size;
            return true;
        }
        if !self.tailing() {
            return false;
        }
        *offset += rows;
        token.sleep(self.sleep_interval)
    }

    fn load_targets(&self, page: &[T]) -> StorageResult<FxHashMap<i64, T>> {
        let ids: Vec<i64> = page.iter().map(T::id).collect();
        let mut found = FxHashMap::default();
        for chunk in ids.chunks(MAX_LOOKUP_IDS) {
            let rows = self
                .target
                .query(&id_lookup_sql("*", T::TABLE, chunk.len()), &id_args(chunk))?;
            for row in rows.iter() {
                let entity = T::from_row(&row)?;
                found.insert(entity.id(), entity);
            }
        }
        Ok(found)
    }

    fn load_base_ids(&self, ids: &[i64]) -> StorageResult<FxHashSet<i64>> {
        let mut present = FxHashSet::default();
        for chunk in ids.chunks(MAX_LOOKUP_IDS) {
            let rows = self
                .base
                .query(&id_lookup_sql("id", T::TABLE, chunk.len()), &id_args(chunk))?;
            for row in rows.iter() {
                present.insert(row.get::<i64>("id")?);
            }
        }
        Ok(present)
    }

    /// Decide whether a failed page is retried. Returns `Ok(false)` if the
    /// run was cancelled during the back-off.
    fn back_off(
        &self,
        token: &CancellationToken,
        scan: Scan,
        offset: usize,
        err: StorageError,
        failures: &mut u32,
    ) -> MigratorResult<bool> {
        *failures += 1;
        if !err.is_transient() || *failures > self.max_consecutive_errors {
            error!(
                table = T::TABLE,
                scan = scan.as_str(),
                offset,
                failures = *failures,
                error = %err,
                "scan aborted"
            );
            return Err(err.into());
        }
        warn!(
            table = T::TABLE,
            scan = scan.as_str(),
            offset,
            failures = *failures,
            error = %err,
            "page failed, backing off"
        );
        Ok(token.sleep(self.error_backoff))
    }

    fn notify(&self, id: i64, kind: InconsistentEventType, report: &mut ValidationReport) {
        match kind {
            InconsistentEventType::TargetMissing => report.target_missing += 1,
            InconsistentEventType::NotEqual => report.not_equal += 1,
            InconsistentEventType::BaseMissing => report.base_missing += 1,
        }
        let event = InconsistentEvent::new(id, self.direction, kind);
        if let Err(e) = self.producer.publish(&event) {
            report.notify_failures += 1;
            warn!(
                table = T::TABLE,
                id,
                direction = %self.direction,
                kind = %kind,
                error = %e,
                "failed to publish inconsistency event"
            );
        }
    }
}

fn decode<T: Entity>(rows: &Rows) -> StorageResult<Vec<T>> {
    rows.iter().map(|row| T::from_row(&row)).collect()
}

fn ids_of(rows: &Rows) -> StorageResult<Vec<i64>> {
    rows.iter().map(|row| row.get::<i64>("id")).collect()
}

fn id_lookup_sql(select: &str, table: &str, n: usize) -> String {
    let placeholders: Vec<String> = (1..=n).map(|i| format!("?{i}")).collect();
    format!(
        "SELECT {select} FROM {table} WHERE id IN ({})",
        placeholders.join(", ")
    )
}

fn id_args(ids: &[i64]) -> Vec<Value> {
    ids.iter().map(|&id| Value::Integer(id)).collect()
}

fn spawn_error(scan: Scan, e: std::io::Error) -> MigratorError {
    MigratorError::Internal {
        message: format!("spawn {} scan thread: {e}", scan.as_str()),
    }
}

fn join_scan(
    handle: thread::ScopedJoinHandle<'_, MigratorResult<ValidationReport>>,
    scan: Scan,
) -> MigratorResult<ValidationReport> {
    handle.join().unwrap_or_else(|_| {
        Err(MigratorError::Internal {
            message: format!("{} scan thread panicked", scan.as_str()),
        })
    })
}
