//! Publish-side API seen by application code.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::HandlerError;
use crate::event::DomainEvent;

/// Error type for publish operations.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Connection to the bus or broker failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The bus or broker rejected the event
    #[error("event rejected: {0}")]
    Rejected(String),
    /// Timeout waiting for acknowledgment
    #[error("publish timeout")]
    Timeout,
    /// An in-process handler failed
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("publisher state poisoned during {0}")]
    Poisoned(&'static str),
    #[error("publish error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

/// Publishes domain events.
///
/// Callers cannot tell from the return value whether an event was delivered
/// or captured for later relay; business code stays transaction-agnostic.
/// A well-formed event never makes the capture path fail.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a single event, blocking until it is handed off.
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError>;

    /// Publish a single event, suspending until it is handed off (not
    /// until it is delivered).
    async fn publish_async(&self, event: DomainEvent) -> Result<(), PublishError> {
        self.publish(event)
    }

    /// Publish events in order. Default implementation publishes sequentially.
    fn publish_batch(&self, events: Vec<DomainEvent>) -> Result<(), PublishError> {
        for event in events {
            self.publish(event)?;
        }
        Ok(())
    }

    async fn publish_batch_async(&self, events: Vec<DomainEvent>) -> Result<(), PublishError> {
        for event in events {
            self.publish_async(event).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<B: EventBus + ?Sized> EventBus for Arc<B> {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        (**self).publish(event)
    }

    async fn publish_async(&self, event: DomainEvent) -> Result<(), PublishError> {
        (**self).publish_async(event).await
    }

    fn publish_batch(&self, events: Vec<DomainEvent>) -> Result<(), PublishError> {
        (**self).publish_batch(events)
    }

    async fn publish_batch_async(&self, events: Vec<DomainEvent>) -> Result<(), PublishError> {
        (**self).publish_batch_async(events).await
    }
}
