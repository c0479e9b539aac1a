//! Notification queue and fixer settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// In-process message queue carrying inconsistency events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub topic: String,
    /// Partition count; events are keyed by record id.
    pub partitions: usize,
    /// Bounded capacity per partition.
    pub capacity: usize,
    /// Extra delivery attempts after a handler failure.
    pub max_redeliveries: u32,
    /// Pause before each redelivery. Default: 100ms.
    pub redelivery_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: "migrator_inconsistent_events".to_string(),
            partitions: 4,
            capacity: 1024,
            max_redeliveries: 3,
            redelivery_backoff_ms: 100,
        }
    }
}

impl QueueConfig {
    pub fn redelivery_backoff(&self) -> Duration {
        Duration::from_millis(self.redelivery_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixerConfig {
    /// Deadline for repairing one event. Default: 1000ms.
    pub timeout_ms: u64,
}

impl Default for FixerConfig {
    fn default() -> Self {
        Self { timeout_ms: 1000 }
    }
}

impl FixerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
