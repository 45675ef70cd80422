use std::sync::Mutex;

use event_emitter_rs::EventEmitter;

use super::{EventBus, PublishError};
use crate::event::DomainEvent;

/// Fans events out to `event_emitter_rs` listeners keyed by event type.
///
/// Listeners receive the raw payload string. Delivery happens on the
/// emitter's own threads, so `publish` returns before listeners run.
pub struct EmitterBus {
    emitter: Mutex<EventEmitter>,
}

impl EmitterBus {
    pub fn new(emitter: EventEmitter) -> Self {
        EmitterBus {
            emitter: Mutex::new(emitter),
        }
    }

    /// Subscribe `listener` to payloads of `event_type`.
    pub fn on<F>(&self, event_type: &str, listener: F) -> Result<(), PublishError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.emitter
            .lock()
            .map_err(|_| PublishError::Poisoned("emitter subscribe"))?
            .on(event_type, listener);
        Ok(())
    }
}

impl Default for EmitterBus {
    fn default() -> Self {
        Self::new(EventEmitter::new())
    }
}

impl EventBus for EmitterBus {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| PublishError::Poisoned("emitter publish"))?;
        let _ = emitter.emit(event.event_type(), event.payload().to_string());
        Ok(())
    }
}
