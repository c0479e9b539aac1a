//! Shared traits used across migrator crates.

pub mod cancellation;
pub mod entity;
pub mod producer;
pub mod storage;

pub use cancellation::CancellationToken;
pub use entity::Entity;
pub use producer::Producer;
pub use storage::{ConnPool, RowRef, Rows, Transaction, TxOptions};
