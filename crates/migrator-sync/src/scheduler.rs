//! Scheduler: switches the write pattern and owns the background validation runs.
//!
//! All transitions go through one mutex. At most one full and one
//! incremental run are live; starting another of the same kind cancels the
//! previous one first. A run's direction is fixed at launch from the
//! router's pattern.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use migrator_core::config::ValidationConfig;
use migrator_core::{
    CancellationToken, Entity, MigratorError, MigratorErrorCode, MigratorResult, Pattern,
    Producer, Side,
};
use migrator_storage::DoubleWritePool;
use serde::Serialize;
use tracing::{error, info};

use crate::validator::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Full,
    Incremental,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handed back by a start call.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub kind: RunKind,
    pub generation: u64,
    pub direction: Side,
    token: CancellationToken,
}

impl RunTicket {
    /// True once the run was stopped, superseded or shut down.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub generation: u64,
    pub direction: Side,
    /// False once a single-pass run has finished on its own.
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub pattern: Pattern,
    pub full: Option<RunStatus>,
    pub incremental: Option<RunStatus>,
}

struct ActiveRun {
    generation: u64,
    direction: Side,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveRun {
    fn status(&self) -> RunStatus {
        RunStatus {
            generation: self.generation,
            direction: self.direction,
            running: !self.handle.is_finished(),
        }
    }
}

struct State {
    generation: u64,
    full: Option<ActiveRun>,
    incremental: Option<ActiveRun>,
}

impl State {
    fn slot(&mut self, kind: RunKind) -> &mut Option<ActiveRun> {
        match kind {
            RunKind::Full => &mut self.full,
            RunKind::Incremental => &mut self.incremental,
        }
    }
}

pub struct Scheduler<T: Entity> {
    pool: Arc<DoubleWritePool>,
    producer: Arc<dyn Producer>,
    config: ValidationConfig,
    root: CancellationToken,
    state: Mutex<State>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Scheduler<T> {
    /// `config` supplies batch size and error handling for every run.
    pub fn new(
        pool: Arc<DoubleWritePool>,
        producer: Arc<dyn Producer>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            pool,
            producer,
            config,
            root: CancellationToken::new(),
            state: Mutex::new(State {
                generation: 0,
                full: None,
                incremental: None,
            }),
            _entity: PhantomData,
        }
    }

    fn lock(&self) -> MigratorResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| MigratorError::Internal {
            message: "scheduler state lock poisoned".to_string(),
        })
    }

    pub fn pool(&self) -> &Arc<DoubleWritePool> {
        &self.pool
    }

    /// The router's active pattern.
    pub fn pattern(&self) -> MigratorResult<Pattern> {
        let _state = self.lock()?;
        Ok(self.pool.pattern())
    }

    /// Switch the router. Running validations keep their direction.
    /// Returns the previous pattern.
    pub fn set_pattern(&self, pattern: Pattern) -> MigratorResult<Pattern> {
        let _state = self.lock()?;
        Ok(self.pool.change_pattern(pattern))
    }

    pub fn set_pattern_named(&self, name: &str) -> MigratorResult<Pattern> {
        self.set_pattern(name.parse()?)
    }

    /// Single pass over both stores from the beginning.
    pub fn start_full(&self) -> MigratorResult<RunTicket> {
        self.launch(RunKind::Full, 0, Duration::ZERO)
    }

    /// Scan rows updated at or after `utime`, re-polling every `interval`
    /// (zero means a single pass).
    pub fn start_incremental(&self, utime: i64, interval: Duration) -> MigratorResult<RunTicket> {
        self.launch(RunKind::Incremental, utime, interval)
    }

    /// Returns whether a run was active. Safe to call when none is.
    pub fn stop_full(&self) -> MigratorResult<bool> {
        self.stop(RunKind::Full)
    }

    pub fn stop_incremental(&self) -> MigratorResult<bool> {
        self.stop(RunKind::Incremental)
    }

    pub fn status(&self) -> MigratorResult<SchedulerStatus> {
        let state = self.lock()?;
        Ok(SchedulerStatus {
            pattern: self.pool.pattern(),
            full: state.full.as_ref().map(ActiveRun::status),
            incremental: state.incremental.as_ref().map(ActiveRun::status),
        })
    }

    /// Cancel both runs and wait for their threads.
    pub fn shutdown(&self) {
        self.root.cancel();
        let runs: Vec<ActiveRun> = match self.lock() {
            Ok(mut state) => [state.full.take(), state.incremental.take()]
                .into_iter()
                .flatten()
                .collect(),
            Err(e) => {
                error!(error = %e, "scheduler shutdown could not collect runs");
                Vec::new()
            }
        };
        for run in runs {
            if run.handle.join().is_err() {
                error!(generation = run.generation, "validation thread panicked");
            }
        }
        info!(table = T::TABLE, "scheduler shut down");
    }

    fn launch(&self, kind: RunKind, utime: i64, interval: Duration) -> MigratorResult<RunTicket> {
        let mut state = self.lock()?;
        // The router holds the only copy of the pattern.
        let direction = self.pool.pattern().authoritative();

        if let Some(previous) = state.slot(kind).take() {
            previous.token.cancel();
            info!(kind = %kind, generation = previous.generation, "previous validation run cancelled");
        }

        let validator = Validator::<T>::from_config(
            Arc::clone(self.pool.side(direction)),
            Arc::clone(self.pool.side(direction.other())),
            direction,
            Arc::clone(&self.producer),
            &self.config,
        )
        .utime(utime)
        .sleep_interval(interval);

        state.generation += 1;
        let generation = state.generation;
        let token = self.root.child_token();
        let run_token = token.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-{kind}-validation-{generation}", T::TABLE))
            .spawn(move || match validator.validate(&run_token) {
                Ok(report) => info!(
                    kind = %kind,
                    generation,
                    events = report.events(),
                    cancelled = run_token.is_cancelled(),
                    "validation run finished"
                ),
                Err(e) => error!(
                    kind = %kind,
                    generation,
                    code = e.error_code(),
                    error = %e,
                    "validation run failed"
                ),
            })
            .map_err(|e| MigratorError::Internal {
                message: format!("spawn {kind} validation: {e}"),
            })?;

        *state.slot(kind) = Some(ActiveRun {
            generation,
            direction,
            token: token.clone(),
            handle,
        });
        info!(kind = %kind, generation, direction = %direction, utime, "validation run started");
        Ok(RunTicket {
            kind,
            generation,
            direction,
            token,
        })
    }

    fn stop(&self, kind: RunKind) -> MigratorResult<bool> {
        let mut state = self.lock()?;
        match state.slot(kind).take() {
            Some(run) => {
                run.token.cancel();
                info!(kind = %kind, generation = run.generation, "validation run stopped");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<T: Entity> Drop for Scheduler<T> {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
