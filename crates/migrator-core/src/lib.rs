//! # migrator-core
//!
//! Foundation crate for the dual-write migrator.
//! Defines the storage connection contract, the entity contract, patterns,
//! inconsistency events, errors, config, cancellation and tracing setup.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod errors;
pub mod events;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use config::MigratorConfig;
pub use errors::{MigratorError, MigratorErrorCode, MigratorResult, StorageError, StorageResult};
pub use events::{InconsistentEvent, InconsistentEventType};
pub use traits::{CancellationToken, ConnPool, Entity, Producer, RowRef, Rows, Transaction, TxOptions};
pub use types::{Pattern, Side};

/// Id sets used when diffing pages.
pub type FxHashSet<T> = rustc_hash::FxHashSet<T>;
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;
