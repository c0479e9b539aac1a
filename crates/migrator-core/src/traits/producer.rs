//! Notification sink for inconsistency events.

use std::sync::Arc;

use crate::errors::MigratorResult;
use crate::events::InconsistentEvent;

/// Publishes inconsistency events; delivery is at-least-once.
pub trait Producer: Send + Sync {
    fn publish(&self, event: &InconsistentEvent) -> MigratorResult<()>;
}

impl<T: Producer + ?Sized> Producer for Arc<T> {
    fn publish(&self, event: &InconsistentEvent) -> MigratorResult<()> {
        (**self).publish(event)
    }
}
