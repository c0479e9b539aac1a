//! # migrator-sync
//!
//! Keeping the two sides converged while a migration is live.
//! - `validator`: forward and reverse scans that publish inconsistency events.
//! - `fixer`: overwrite one record on the non-authoritative side.
//! - `queue` / `consumer`: partitioned in-process event queue and the
//!   consumer group that feeds events to the fixers.
//! - `scheduler` / `control`: pattern switching plus start/stop of full and
//!   incremental validation runs, and the request types that drive them.
//! - `runtime`: everything above wired from a `MigratorConfig`.

pub mod consumer;
pub mod control;
pub mod fixer;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod validator;

pub use consumer::FixConsumer;
pub use control::{ControlRequest, ControlResponse};
pub use fixer::OverrideFixer;
pub use queue::{ConsumerGroup, ConsumerStats, EventHandler, MessageQueue, QueueProducer};
pub use runtime::MigrationRuntime;
pub use scheduler::{RunKind, RunStatus, RunTicket, Scheduler, SchedulerStatus};
pub use validator::{ValidationReport, Validator};
