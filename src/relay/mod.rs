//! Relay: drains committed outbox records to the broker.
//!
//! ```text
//!  ┌────────────┐ find_pending_events_after_id(cursor) ┌────────────────┐
//!  │   ledger   │◀─────────────────────────────────────│ RelayProcessor │
//!  └────────────┘                                      └────────────────┘
//!        ▲                                                     │ route + spawn send
//!        │ update_status(PROCESSED | FAILED)                   ▼
//!        └───────────────────────────────────────────── BrokerSink::send
//! ```

mod processor;
mod router;
mod runner;
mod sink;

pub use processor::{DeliveryOutcome, RelayProcessor, Settled, TickReport, DEFAULT_BATCH_SIZE};
pub use router::TopicRouter;
pub use runner::{RelayHandle, RelayStats};
pub use sink::{
    BrokerMessage, BrokerSink, DeliveryReceipt, InMemoryBroker, AGGREGATE_ID_HEADER,
    EVENT_ID_HEADER, EVENT_TYPE_HEADER, OUTBOX_ID_HEADER,
};
