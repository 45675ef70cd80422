//! Ledger side of the outbox: records, the store contract, payload codecs,
//! and the before-commit writer that captures deferred events.

mod codec;
mod in_memory;
mod record;
mod store;
mod writer;

pub use codec::PayloadCodec;
pub use in_memory::{InMemoryOutboxStore, InMemoryTx};
pub use record::{OutboxRecord, OutboxStatus, RecordId};
pub use store::{OutboxStore, StoreError, Transactional};
pub use writer::OutboxWriter;
