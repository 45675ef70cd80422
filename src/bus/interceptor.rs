use async_trait::async_trait;
use tracing::debug;

use super::{EventBus, PublishError};
use crate::config::OutboxConfig;
use crate::event::DomainEvent;
use crate::transaction::{ambient, DeferredEvents};

/// Bus decorator that captures events published inside a transaction.
///
/// With an ambient transaction the event is appended to that transaction's
/// deferred list and the inner bus never sees it; the outbox writer turns it
/// into a ledger row at commit. Without one the call is forwarded unchanged.
pub struct TransactionalEventBus<B> {
    inner: B,
    capture: bool,
}

impl<B: EventBus> TransactionalEventBus<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            capture: true,
        }
    }

    /// Capture only when the outbox is enabled in `config`.
    pub fn from_config(inner: B, config: &OutboxConfig) -> Self {
        Self::new(inner).with_capture(config.capture_enabled())
    }

    /// Turn capture off to forward every publish to the inner bus.
    pub fn with_capture(mut self, enabled: bool) -> Self {
        self.capture = enabled;
        self
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn ambient(&self) -> Option<DeferredEvents> {
        if self.capture {
            ambient::current()
        } else {
            None
        }
    }

    fn defer(deferred: &DeferredEvents, event: DomainEvent) {
        debug!(
            event_id = %event.event_id(),
            event_type = event.event_type(),
            "publish deferred to outbox"
        );
        deferred.push(event);
    }
}

#[async_trait]
impl<B: EventBus> EventBus for TransactionalEventBus<B> {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        match self.ambient() {
            Some(deferred) => {
                Self::defer(&deferred, event);
                Ok(())
            }
            None => self.inner.publish(event),
        }
    }

    async fn publish_async(&self, event: DomainEvent) -> Result<(), PublishError> {
        match self.ambient() {
            Some(deferred) => {
                Self::defer(&deferred, event);
                Ok(())
            }
            None => self.inner.publish_async(event).await,
        }
    }

    fn publish_batch(&self, events: Vec<DomainEvent>) -> Result<(), PublishError> {
        match self.ambient() {
            Some(deferred) => {
                for event in events {
                    Self::defer(&deferred, event);
                }
                Ok(())
            }
            None => self.inner.publish_batch(events),
        }
    }

    async fn publish_batch_async(&self, events: Vec<DomainEvent>) -> Result<(), PublishError> {
        match self.ambient() {
            Some(deferred) => {
                for event in events {
                    Self::defer(&deferred, event);
                }
                Ok(())
            }
            None => self.inner.publish_batch_async(events).await,
        }
    }
}
