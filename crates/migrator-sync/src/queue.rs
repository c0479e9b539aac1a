//! In-process partitioned message queue for inconsistency events.
//!
//! Each partition is a bounded crossbeam channel. Messages are keyed by
//! record id (`id mod partitions`), so events for one record stay ordered.
//! A `ConsumerGroup` runs one named worker thread per partition and tracks
//! the committed offset of each.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use migrator_core::config::QueueConfig;
use migrator_core::{
    CancellationToken, InconsistentEvent, MigratorError, MigratorResult, Producer,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A message as stored in a partition.
#[derive(Debug, Clone)]
pub struct Message {
    pub partition: usize,
    pub offset: u64,
    pub key: i64,
    pub payload: Vec<u8>,
}

struct Partition {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    /// Offset of the next message. Held across the enqueue so offsets enter
    /// the channel in order and a rejected send consumes none.
    next_offset: Mutex<u64>,
    committed: AtomicU64,
}

/// A named topic split into bounded partitions.
pub struct MessageQueue {
    topic: String,
    partitions: Vec<Partition>,
    max_redeliveries: u32,
    redelivery_backoff: Duration,
}

impl MessageQueue {
    pub fn new(config: &QueueConfig) -> MigratorResult<Self> {
        if config.partitions == 0 || config.capacity == 0 {
            return Err(MigratorError::config(
                "queue partitions and capacity must be positive",
            ));
        }
        let partitions = (0..config.partitions)
            .map(|_| {
                let (tx, rx) = bounded(config.capacity);
                Partition {
                    tx,
                    rx,
                    next_offset: Mutex::new(0),
                    committed: AtomicU64::new(0),
                }
            })
            .collect();
        Ok(Self {
            topic: config.topic.clone(),
            partitions,
            max_redeliveries: config.max_redeliveries,
            redelivery_backoff: config.redelivery_backoff(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition_for(&self, key: i64) -> usize {
        key.rem_euclid(self.partitions.len() as i64) as usize
    }

    /// Append a payload. Blocks up to one second when the partition is full.
    /// Returns `(partition, offset)`.
    pub fn send(&self, key: i64, payload: Vec<u8>) -> MigratorResult<(usize, u64)> {
        let partition = self.partition_for(key);
        let slot = &self.partitions[partition];
        let mut next = slot.next_offset.lock().map_err(|_| {
            MigratorError::queue(format!("{} partition {partition} lock poisoned", self.topic))
        })?;
        let offset = *next;
        let message = Message {
            partition,
            offset,
            key,
            payload,
        };
        slot.tx
            .send_timeout(message, SEND_TIMEOUT)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => {
                    MigratorError::queue(format!("{} partition {partition} is full", self.topic))
                }
                SendTimeoutError::Disconnected(_) => {
                    MigratorError::queue(format!("{} partition {partition} is closed", self.topic))
                }
            })?;
        *next += 1;
        Ok((partition, offset))
    }

    /// Offset after the last acknowledged message of `partition`.
    pub fn committed_offset(&self, partition: usize) -> u64 {
        self.partitions
            .get(partition)
            .map_or(0, |p| p.committed.load(Ordering::SeqCst))
    }

    /// Messages appended but not yet acknowledged, across all partitions.
    pub fn lag(&self) -> u64 {
        self.partitions
            .iter()
            .map(|p| {
                let next = *p.next_offset.lock().unwrap_or_else(PoisonError::into_inner);
                next.saturating_sub(p.committed.load(Ordering::SeqCst))
            })
            .sum()
    }
}

/// `Producer` writing JSON events keyed by record id.
#[derive(Clone)]
pub struct QueueProducer {
    queue: Arc<MessageQueue>,
}

impl QueueProducer {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self { queue }
    }
}

impl Producer for QueueProducer {
    fn publish(&self, event: &InconsistentEvent) -> MigratorResult<()> {
        let payload = serde_json::to_vec(event)?;
        let (partition, offset) = self.queue.send(event.id, payload)?;
        debug!(
            topic = %self.queue.topic,
            partition,
            offset,
            id = event.id,
            kind = %event.kind,
            "event published"
        );
        Ok(())
    }
}

/// Processes one decoded event. An error triggers redelivery.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &InconsistentEvent) -> MigratorResult<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&InconsistentEvent) -> MigratorResult<()> + Send + Sync,
{
    fn handle(&self, event: &InconsistentEvent) -> MigratorResult<()> {
        self(event)
    }
}

/// Totals across all workers of a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    /// Messages the handler accepted.
    pub handled: u64,
    /// Handler retries.
    pub redelivered: u64,
    /// Messages acknowledged after the handler kept failing.
    pub dropped: u64,
    /// Messages acknowledged because they could not be decoded.
    pub undecodable: u64,
}

#[derive(Default)]
struct Counters {
    handled: AtomicU64,
    redelivered: AtomicU64,
    dropped: AtomicU64,
    undecodable: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            handled: self.handled.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            undecodable: self.undecodable.load(Ordering::Relaxed),
        }
    }
}

/// One worker thread per partition, delivering to a shared handler.
pub struct ConsumerGroup {
    queue: Arc<MessageQueue>,
    token: CancellationToken,
    counters: Arc<Counters>,
    workers: Vec<JoinHandle<()>>,
}

impl ConsumerGroup {
    pub fn start(queue: Arc<MessageQueue>, handler: Arc<dyn EventHandler>) -> MigratorResult<Self> {
        let token = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let mut group = Self {
            queue: Arc::clone(&queue),
            token,
            counters,
            workers: Vec::with_capacity(queue.partitions()),
        };

        for partition in 0..queue.partitions() {
            let worker = Worker {
                queue: Arc::clone(&queue),
                partition,
                handler: Arc::clone(&handler),
                token: group.token.clone(),
                counters: Arc::clone(&group.counters),
            };
            let spawned = thread::Builder::new()
                .name(format!("{}-consumer-{partition}", queue.topic))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => group.workers.push(handle),
                Err(e) => {
                    group.stop();
                    return Err(MigratorError::Internal {
                        message: format!("spawn consumer for partition {partition}: {e}"),
                    });
                }
            }
        }
        info!(topic = %queue.topic, partitions = queue.partitions(), "consumer group started");
        Ok(group)
    }

    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot()
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Stop the workers after their current message and wait for them.
    pub fn stop(&mut self) -> ConsumerStats {
        self.token.cancel();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!(topic = %self.queue.topic, "consumer worker panicked");
            }
        }
        self.stats()
    }
}

impl Drop for ConsumerGroup {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct Worker {
    queue: Arc<MessageQueue>,
    partition: usize,
    handler: Arc<dyn EventHandler>,
    token: CancellationToken,
    counters: Arc<Counters>,
}

impl Worker {
    fn run(self) {
        let rx = self.queue.partitions[self.partition].rx.clone();
        while !self.token.is_cancelled() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(message) => {
                    if !self.process(&message) {
                        break;
                    }
                    self.queue.partitions[self.partition]
                        .committed
                        .store(message.offset + 1, Ordering::SeqCst);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(topic = %self.queue.topic, partition = self.partition, "consumer worker stopped");
    }

    /// Returns `false` when the group stopped before the message was
    /// settled; it is then left unacknowledged.
    fn process(&self, message: &Message) -> bool {
        let topic = &self.queue.topic;
        let event: InconsistentEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                self.counters.undecodable.fetch_add(1, Ordering::Relaxed);
                error!(
                    topic = %topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "undecodable message skipped"
                );
                return true;
            }
        };

        let max = self.queue.max_redeliveries;
        for attempt in 0..=max {
            match self.handler.handle(&event) {
                Ok(()) => {
                    self.counters.handled.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(e) if attempt < max => {
                    self.counters.redelivered.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        topic = %topic,
                        partition = message.partition,
                        offset = message.offset,
                        id = event.id,
                        attempt = attempt + 1,
                        error = %e,
                        "handler failed, redelivering"
                    );
                    if !self.token.sleep(self.queue.redelivery_backoff) {
                        debug!(
                            topic = %topic,
                            partition = message.partition,
                            offset = message.offset,
                            "consumer stopped during redelivery back-off"
                        );
                        return false;
                    }
                }
                Err(e) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(
                        topic = %topic,
                        partition = message.partition,
                        offset = message.offset,
                        id = event.id,
                        attempts = max + 1,
                        error = %e,
                        "handler failed, giving up"
                    );
                }
            }
        }
        true
    }
}
