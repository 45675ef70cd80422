pub mod bus;
mod config;
mod error;
mod event;
pub mod lock;
pub mod outbox;
pub mod relay;
pub mod transaction;

pub use bus::{
    EventBus, EventHandler, HandlerBus, HandlerError, LogBus, PublishError, TransactionalEventBus,
};
#[cfg(feature = "emitter")]
pub use bus::EmitterBus;
pub use config::{BrokerSettings, ConfigError, OutboxConfig, RelaySettings, RoutingConfig, RoutingRule};
pub use error::{CodecError, OutboxError};
pub use event::{DomainEvent, TypedEvent, CORRELATION_ID_KEY};
pub use lock::{DistributedLock, InMemoryLock, LockError};
pub use outbox::{
    InMemoryOutboxStore, InMemoryTx, OutboxRecord, OutboxStatus, OutboxStore, OutboxWriter,
    PayloadCodec, RecordId, StoreError, Transactional,
};
pub use relay::{
    BrokerMessage, BrokerSink, DeliveryReceipt, InMemoryBroker, RelayHandle, RelayProcessor,
    RelayStats, TopicRouter,
};
pub use transaction::{BeforeCommit, DeferredEvents, Transaction, TransactionManager};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
