//! Error types (thiserror) with stable error codes.

pub mod error_code;
pub mod migrator_error;
pub mod storage_error;

pub use error_code::MigratorErrorCode;
pub use migrator_error::{MigratorError, MigratorResult};
pub use storage_error::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;
