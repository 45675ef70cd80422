use std::sync::{Arc, Mutex};

use tracing::info;

use super::{EventBus, PublishError};
use crate::event::DomainEvent;

/// A bus that writes each event as a log line, to a buffer or to `tracing`.
#[derive(Clone, Default)]
pub struct LogBus {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogBus {
    pub fn new() -> Self {
        LogBus { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogBus {
            buffer: Some(buffer),
        }
    }
}

impl EventBus for LogBus {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        let meta = if event.all_metadata().is_empty() {
            String::new()
        } else {
            format!(" meta={:?}", event.all_metadata())
        };
        let line = format!("[EVENT] {} {}{}", event.event_type(), event.payload(), meta);
        match &self.buffer {
            Some(buffer) => buffer
                .lock()
                .map_err(|_| PublishError::Poisoned("log buffer"))?
                .push(line),
            None => info!(event_id = %event.event_id(), "{line}"),
        }
        Ok(())
    }
}
