//! The contract every migratable record type implements.

use rusqlite::types::Value;

use crate::errors::StorageResult;
use crate::traits::storage::RowRef;

/// A record that can be diffed between two stores and copied across.
///
/// Instances are value snapshots read at scan time. `compare_to` compares
/// business content only; technical columns such as `utime` stay out of it.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Table (or collection) holding this entity on both sides.
    const TABLE: &'static str;

    /// Column carrying the update timestamp used by incremental scans.
    const UTIME_COLUMN: &'static str = "utime";

    /// Stable 64-bit identifier, stored in the `id` column.
    fn id(&self) -> i64;

    /// Last update timestamp.
    fn utime(&self) -> i64;

    /// Content equality between two snapshots of the same record.
    fn compare_to(&self, other: &Self) -> bool;

    /// Decode from a full row (`SELECT *`).
    fn from_row(row: &RowRef<'_>) -> StorageResult<Self>;

    /// All persisted columns, `id` included.
    fn to_columns(&self) -> Vec<(&'static str, Value)>;
}
