//! # migrator-storage
//!
//! Storage side of the migrator.
//! - `sqlite`: a `ConnPool` over SQLite (1 writer + round-robin readers, WAL,
//!   one dedicated connection per transaction).
//! - `router`: `DoubleWritePool`, the pattern-driven dual-write facade, and
//!   the strategy invoked when the secondary side of a dual write fails.

pub mod router;
pub mod sqlite;

pub use router::{
    DoubleWritePool, DoubleWriteTx, FailureClass, LoggingFailureHandler, RouterState,
    SecondaryFailure, SecondaryFailureHandler, SecondaryFailureStats, SecondaryOp,
};
pub use sqlite::SqliteStore;
