use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{BrokerMessage, BrokerSink, TopicRouter};
use crate::config::OutboxConfig;
use crate::error::OutboxError;
use crate::lock::DistributedLock;
use crate::outbox::{OutboxStatus, OutboxStore, RecordId};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// How one dispatched record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Acknowledged and marked `Processed`.
    Processed(RecordId),
    /// Rejected by the broker and marked `Failed`.
    Failed(RecordId),
    /// The broker answered but the status update did not land; the record
    /// is still `Pending` in the ledger.
    Unrecorded(RecordId),
}

/// Per-outcome counts once every delivery of a tick has completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settled {
    pub processed: usize,
    pub failed: usize,
    pub unrecorded: usize,
}

/// Result of one relay tick.
///
/// Deliveries keep running after the tick returns; [`settle`](Self::settle)
/// waits for them.
#[derive(Debug)]
pub struct TickReport {
    pub skipped: bool,
    pub cursor: Option<RecordId>,
    deliveries: Vec<JoinHandle<DeliveryOutcome>>,
}

impl TickReport {
    fn skipped(cursor: Option<RecordId>) -> Self {
        Self {
            skipped: true,
            cursor,
            deliveries: Vec::new(),
        }
    }

    fn idle(cursor: Option<RecordId>) -> Self {
        Self {
            skipped: false,
            cursor,
            deliveries: Vec::new(),
        }
    }

    pub fn dispatched(&self) -> usize {
        self.deliveries.len()
    }

    pub async fn settle(self) -> Settled {
        let mut settled = Settled::default();
        for delivery in self.deliveries {
            match delivery.await {
                Ok(DeliveryOutcome::Processed(_)) => settled.processed += 1,
                Ok(DeliveryOutcome::Failed(_)) => settled.failed += 1,
                Ok(DeliveryOutcome::Unrecorded(_)) | Err(_) => settled.unrecorded += 1,
            }
        }
        settled
    }
}

struct LockGate {
    lock: Arc<dyn DistributedLock>,
    name: String,
    ttl: Duration,
}

/// Drains pending ledger records to a broker.
///
/// Holds the cursor: the highest record id already handed to the sink. It is
/// seeded from the store on construction and only ever moves forward.
pub struct RelayProcessor<S, K> {
    store: Arc<S>,
    sink: Arc<K>,
    router: TopicRouter,
    batch_size: usize,
    cursor: Option<RecordId>,
    gate: Option<LockGate>,
}

impl<S, K> RelayProcessor<S, K>
where
    S: OutboxStore + 'static,
    K: BrokerSink + 'static,
{
    pub fn new(store: Arc<S>, sink: Arc<K>, router: TopicRouter) -> Result<Self, OutboxError> {
        let cursor = store.last_processed_event_id()?;
        debug!(cursor = ?cursor, "relay cursor seeded");
        Ok(Self {
            store,
            sink,
            router,
            batch_size: DEFAULT_BATCH_SIZE,
            cursor,
            gate: None,
        })
    }

    /// A processor with batch size, routing and lock settings taken from `config`.
    /// The lock is only used when one is given.
    pub fn from_config(
        store: Arc<S>,
        sink: Arc<K>,
        config: &OutboxConfig,
        lock: Option<Arc<dyn DistributedLock>>,
    ) -> Result<Self, OutboxError> {
        let mut processor = Self::new(store, sink, TopicRouter::from_config(&config.routing))?
            .with_batch_size(config.relay.batch_size);
        if let Some(lock) = lock {
            processor = processor.with_lock(
                lock,
                config.relay.lock_name.clone(),
                config.relay.lock_ttl(),
            );
        }
        Ok(processor)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Only run ticks while holding the lease `name` on `lock`.
    ///
    /// Once taken, the lease is kept and refreshed by every tick, so another
    /// replica stays out while this one has deliveries in flight. It is given
    /// up by [`release_lock`](Self::release_lock) or by expiring.
    pub fn with_lock(
        mut self,
        lock: Arc<dyn DistributedLock>,
        name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        self.gate = Some(LockGate {
            lock,
            name: name.into(),
            ttl,
        });
        self
    }

    pub fn cursor(&self) -> Option<RecordId> {
        self.cursor
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Fetch one batch after the cursor and dispatch it.
    ///
    /// Returns once every send has been handed off, without waiting for
    /// acknowledgements. A fetch or lock failure ends the tick with an error
    /// and leaves the cursor where it was.
    pub async fn tick(&mut self) -> Result<TickReport, OutboxError> {
        if let Some(gate) = &self.gate {
            if !gate.lock.acquire(&gate.name, gate.ttl)? {
                debug!(lock = %gate.name, "relay lock held elsewhere, skipping tick");
                return Ok(TickReport::skipped(self.cursor));
            }
        }

        self.dispatch_batch()
    }

    /// Give up the relay lease, if this processor is lock-gated.
    pub fn release_lock(&self) {
        if let Some(gate) = &self.gate {
            match gate.lock.release(&gate.name) {
                Ok(()) => debug!(lock = %gate.name, "relay lock released"),
                Err(err) => warn!(lock = %gate.name, error = %err, "failed to release relay lock"),
            }
        }
    }

    fn dispatch_batch(&mut self) -> Result<TickReport, OutboxError> {
        let records = self
            .store
            .find_pending_events_after_id(self.cursor, self.batch_size)?;
        let Some(last) = records.last().map(|r| r.id) else {
            return Ok(TickReport::idle(self.cursor));
        };
        debug!(count = records.len(), cursor = ?self.cursor, "dispatching outbox batch");

        let deliveries = records
            .iter()
            .map(|record| {
                let message = BrokerMessage::from_record(record, self.router.route(&record.event_type));
                tokio::spawn(deliver(
                    Arc::clone(&self.store),
                    Arc::clone(&self.sink),
                    record.id,
                    message,
                ))
            })
            .collect();

        self.advance(last);
        Ok(TickReport {
            skipped: false,
            cursor: self.cursor,
            deliveries,
        })
    }

    fn advance(&mut self, to: RecordId) {
        if self.cursor.map_or(true, |current| to > current) {
            self.cursor = Some(to);
        }
    }
}

async fn deliver<S, K>(
    store: Arc<S>,
    sink: Arc<K>,
    id: RecordId,
    message: BrokerMessage,
) -> DeliveryOutcome
where
    S: OutboxStore,
    K: BrokerSink,
{
    let topic = message.topic.clone();
    let status = match AssertUnwindSafe(sink.send(message)).catch_unwind().await {
        Ok(Ok(receipt)) => {
            debug!(record_id = %id, topic = %topic, offset = receipt.offset, "outbox record delivered");
            OutboxStatus::Processed
        }
        Ok(Err(err)) => {
            warn!(record_id = %id, topic = %topic, error = %err, "outbox delivery failed");
            OutboxStatus::Failed
        }
        Err(_) => {
            warn!(record_id = %id, topic = %topic, "outbox delivery panicked");
            OutboxStatus::Failed
        }
    };

    match store.update_status(id, status) {
        Ok(()) if status == OutboxStatus::Processed => DeliveryOutcome::Processed(id),
        Ok(()) => DeliveryOutcome::Failed(id),
        Err(err) => {
            error!(record_id = %id, status = %status, error = %err, "outbox status update failed");
            DeliveryOutcome::Unrecorded(id)
        }
    }
}
