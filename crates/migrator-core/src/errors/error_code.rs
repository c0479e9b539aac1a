//! Stable error codes shared by every migrator error type.

pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const DB_BUSY: &str = "DB_BUSY";
pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
pub const SCHEMA_MISMATCH: &str = "SCHEMA_MISMATCH";
pub const DECODE_ERROR: &str = "DECODE_ERROR";
pub const NOT_SUPPORTED: &str = "NOT_SUPPORTED";
pub const SECONDARY_BEGIN_FAILED: &str = "SECONDARY_BEGIN_FAILED";
pub const LOCK_POISONED: &str = "LOCK_POISONED";
pub const UNKNOWN_PATTERN: &str = "UNKNOWN_PATTERN";
pub const UNKNOWN_DIRECTION: &str = "UNKNOWN_DIRECTION";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
pub const QUEUE_ERROR: &str = "QUEUE_ERROR";
pub const CANCELLED: &str = "CANCELLED";
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Maps an error to a stable, machine-readable code.
pub trait MigratorErrorCode {
    fn error_code(&self) -> &'static str;
}
