use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::trace;

use super::{EventBus, PublishError};
use crate::event::{DomainEvent, TypedEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler for {event_type} failed: {message}")]
pub struct HandlerError {
    pub event_type: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            message: message.into(),
        }
    }
}

/// An in-process subscriber.
pub trait EventHandler: Send + Sync {
    fn can_handle(&self, event_type: &str) -> bool;

    fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

struct FnHandler<F> {
    event_type: String,
    handler: F,
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&DomainEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn can_handle(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        (self.handler)(event)
    }
}

/// Synchronous in-process bus: every registered handler whose
/// `can_handle` matches is invoked in registration order.
///
/// An event nobody handles is not an error.
#[derive(Clone, Default)]
pub struct HandlerBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl HandlerBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: impl EventHandler + 'static) -> Result<(), PublishError> {
        self.handlers
            .write()
            .map_err(|_| PublishError::Poisoned("handler registration"))?
            .push(Arc::new(handler));
        Ok(())
    }

    /// Register a closure for one event type.
    pub fn register_fn<F>(&self, event_type: impl Into<String>, handler: F) -> Result<(), PublishError>
    where
        F: Fn(&DomainEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(FnHandler {
            event_type: event_type.into(),
            handler,
        })
    }

    /// Register a closure that receives the payload decoded as `E`.
    pub fn register_typed<E, F>(&self, handler: F) -> Result<(), PublishError>
    where
        E: TypedEvent,
        F: Fn(E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register_fn(E::EVENT_TYPE, move |event| {
            let decoded = event
                .decode::<E>()
                .map_err(|err| HandlerError::new(E::EVENT_TYPE, err.to_string()))?;
            handler(decoded)
        })
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }
}

impl EventBus for HandlerBus {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        let handlers: Vec<_> = self
            .handlers
            .read()
            .map_err(|_| PublishError::Poisoned("handler dispatch"))?
            .iter()
            .filter(|h| h.can_handle(event.event_type()))
            .cloned()
            .collect();

        trace!(event_type = event.event_type(), handlers = handlers.len(), "dispatching");
        for handler in handlers {
            handler.handle(&event)?;
        }
        Ok(())
    }
}
