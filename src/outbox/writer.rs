use std::sync::Arc;

use tracing::debug;

use super::{OutboxRecord, OutboxStore, PayloadCodec, RecordId};
use crate::config::OutboxConfig;
use crate::error::OutboxError;
use crate::event::DomainEvent;
use crate::transaction::{BeforeCommit, TransactionManager};

/// Before-commit hook that turns deferred events into pending ledger rows.
///
/// Runs inside the committing transaction: a serialization or save failure
/// propagates and aborts the business transaction with it.
pub struct OutboxWriter<S> {
    store: Arc<S>,
    codec: PayloadCodec,
}

impl<S: OutboxStore> OutboxWriter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            codec: PayloadCodec::default(),
        }
    }

    pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn codec(&self) -> PayloadCodec {
        self.codec
    }

    /// Capture one event as a `Pending` record in `tx`.
    pub fn write(&self, tx: &mut S::Tx, event: &DomainEvent) -> Result<RecordId, OutboxError> {
        let payload = self.codec.encode(event)?;
        let record = OutboxRecord::pending(
            RecordId::generate(),
            event.event_id(),
            event.aggregate_id(),
            event.event_type(),
            payload,
        );
        let id = record.id;
        self.store.save(tx, record)?;
        debug!(
            record_id = %id,
            event_id = %event.event_id(),
            event_type = event.event_type(),
            "outbox record captured"
        );
        Ok(id)
    }
}

impl<S: OutboxStore> BeforeCommit<S::Tx> for OutboxWriter<S> {
    fn before_commit(&self, tx: &mut S::Tx, deferred: &[DomainEvent]) -> Result<(), OutboxError> {
        for event in deferred {
            self.write(tx, event)?;
        }
        Ok(())
    }
}

impl<S: OutboxStore + 'static> TransactionManager<S> {
    /// A manager whose transactions write deferred events to `store`'s ledger.
    pub fn with_outbox(store: Arc<S>, codec: PayloadCodec) -> Self {
        let writer = OutboxWriter::new(Arc::clone(&store)).with_codec(codec);
        TransactionManager::new(store).with_hook(writer)
    }

    /// [`with_outbox`](Self::with_outbox) using the codec set in `config`.
    pub fn from_config(store: Arc<S>, config: &OutboxConfig) -> Self {
        Self::with_outbox(store, config.codec)
    }
}
