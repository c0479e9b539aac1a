//! Glue from the event queue to the fixers.

use std::sync::Arc;
use std::time::Duration;

use migrator_core::config::FixerConfig;
use migrator_core::{
    CancellationToken, ConnPool, Entity, InconsistentEvent, MigratorResult, Side,
};
use tracing::debug;

use crate::fixer::OverrideFixer;
use crate::queue::EventHandler;

/// Repairs each event from the side it names as authoritative.
pub struct FixConsumer<T: Entity> {
    /// Src is authoritative, dst gets repaired.
    src_first: OverrideFixer<T>,
    /// Dst is authoritative, src gets repaired.
    dst_first: OverrideFixer<T>,
    timeout: Duration,
    root: CancellationToken,
}

impl<T: Entity> FixConsumer<T> {
    pub fn new(
        src: Arc<dyn ConnPool>,
        dst: Arc<dyn ConnPool>,
        config: &FixerConfig,
    ) -> MigratorResult<Self> {
        Ok(Self {
            src_first: OverrideFixer::new(Arc::clone(&src), Arc::clone(&dst))?,
            dst_first: OverrideFixer::new(dst, src)?,
            timeout: config.timeout(),
            root: CancellationToken::new(),
        })
    }

    /// Cancelling this aborts every in-flight and future repair.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.root
    }

    pub fn consume(&self, event: &InconsistentEvent) -> MigratorResult<()> {
        let fixer = match event.direction {
            Side::Src => &self.src_first,
            Side::Dst => &self.dst_first,
        };
        debug!(
            table = T::TABLE,
            id = event.id,
            direction = %event.direction,
            kind = %event.kind,
            "repairing"
        );
        fixer.fix(&self.root.child_with_timeout(self.timeout), event.id)
    }
}

impl<T: Entity> EventHandler for FixConsumer<T> {
    fn handle(&self, event: &InconsistentEvent) -> MigratorResult<()> {
        self.consume(event)
    }
}
