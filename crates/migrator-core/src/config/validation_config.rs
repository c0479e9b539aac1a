//! Validator tunables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for validation runs. Applies to both full and incremental runs
/// unless the control request overrides `utime`/`sleep_interval_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Rows per page. Default: 100.
    pub batch_size: usize,
    /// Re-poll interval for empty pages. 0 = single pass.
    pub sleep_interval_ms: u64,
    /// Lower bound on `utime` for the forward scan. Default: 0.
    pub utime: i64,
    /// Fixed back-off after a transient store failure. Default: 1000ms.
    pub error_backoff_ms: u64,
    /// Consecutive transient failures tolerated before a scan loop gives up.
    pub max_consecutive_errors: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            sleep_interval_ms: 0,
            utime: 0,
            error_backoff_ms: 1000,
            max_consecutive_errors: 10,
        }
    }
}

impl ValidationConfig {
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
