//! Wires the router, queue, fixer consumers and scheduler from one config.

use std::sync::Arc;

use migrator_core::telemetry::init_tracing;
use migrator_core::{ConnPool, Entity, MigratorConfig, MigratorResult};
use migrator_storage::{DoubleWritePool, RouterState};
use tracing::info;

use crate::consumer::FixConsumer;
use crate::queue::{ConsumerGroup, ConsumerStats, MessageQueue, QueueProducer};
use crate::scheduler::Scheduler;

/// A running migration for one entity type.
///
/// Application writes go through `pool()`. Validation runs publish to the
/// queue and the consumer group repairs from the authoritative side.
pub struct MigrationRuntime<T: Entity> {
    pool: Arc<DoubleWritePool>,
    queue: Arc<MessageQueue>,
    consumers: ConsumerGroup,
    scheduler: Arc<Scheduler<T>>,
}

impl<T: Entity> MigrationRuntime<T> {
    pub fn start(
        config: &MigratorConfig,
        src: Arc<dyn ConnPool>,
        dst: Arc<dyn ConnPool>,
    ) -> MigratorResult<Self> {
        config.validate()?;
        init_tracing(&config.log);

        let state = Arc::new(RouterState::new(config.router.initial_pattern));
        let pool = Arc::new(
            DoubleWritePool::new(Arc::clone(&src), Arc::clone(&dst)).with_state(state),
        );

        let queue = Arc::new(MessageQueue::new(&config.queue)?);
        let fixer = Arc::new(FixConsumer::<T>::new(src, dst, &config.fixer)?);
        let consumers = ConsumerGroup::start(Arc::clone(&queue), fixer)?;

        let producer = Arc::new(QueueProducer::new(Arc::clone(&queue)));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&pool),
            producer,
            config.validation.clone(),
        ));

        info!(
            table = T::TABLE,
            pattern = %config.router.initial_pattern,
            topic = %queue.topic(),
            "migration runtime started"
        );
        Ok(Self {
            pool,
            queue,
            consumers,
            scheduler,
        })
    }

    pub fn pool(&self) -> &Arc<DoubleWritePool> {
        &self.pool
    }

    pub fn scheduler(&self) -> &Arc<Scheduler<T>> {
        &self.scheduler
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn consumer_stats(&self) -> ConsumerStats {
        self.consumers.stats()
    }

    /// Stop validation first, then the consumers.
    pub fn shutdown(mut self) -> ConsumerStats {
        self.scheduler.shutdown();
        let stats = self.consumers.stop();
        info!(
            table = T::TABLE,
            handled = stats.handled,
            dropped = stats.dropped,
            undecodable = stats.undecodable,
            "migration runtime stopped"
        );
        stats
    }
}
