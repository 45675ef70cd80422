mod domain_event;

pub use domain_event::{DomainEvent, TypedEvent, CORRELATION_ID_KEY};
