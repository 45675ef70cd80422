//! Test domain: an order service that writes a business row and publishes
//! through the transactional bus.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tx_outbox::{
    DomainEvent, EventBus, HandlerBus, InMemoryBroker, InMemoryOutboxStore, OutboxConfig,
    OutboxError, PayloadCodec, PublishError, RelayProcessor, TopicRouter, TransactionManager,
    TransactionalEventBus, TypedEvent,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    pub customer: String,
    pub total_cents: u64,
}

impl TypedEvent for OrderCreated {
    const EVENT_TYPE: &'static str = "OrderCreated";

    fn aggregate_id(&self) -> String {
        self.order_id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub payment_id: String,
    pub reason: String,
}

impl TypedEvent for PaymentFailed {
    const EVENT_TYPE: &'static str = "PaymentFailed";

    fn aggregate_id(&self) -> String {
        self.payment_id.clone()
    }
}

pub fn order_created(order_id: &str) -> DomainEvent {
    DomainEvent::from_typed(&OrderCreated {
        order_id: order_id.to_string(),
        customer: "alice".to_string(),
        total_cents: 4200,
    })
    .unwrap()
}

/// Everything a scenario needs, wired the way an application would.
pub struct Harness {
    pub store: Arc<InMemoryOutboxStore>,
    pub manager: TransactionManager<InMemoryOutboxStore>,
    pub bus: TransactionalEventBus<HandlerBus>,
    pub broker: Arc<InMemoryBroker>,
    /// Event types delivered directly to in-process handlers.
    pub delivered: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_codec(PayloadCodec::Json)
    }

    pub fn with_codec(codec: PayloadCodec) -> Self {
        let store = Arc::new(InMemoryOutboxStore::new());
        let config = OutboxConfig {
            codec,
            ..OutboxConfig::default()
        };
        let manager = TransactionManager::from_config(store.clone(), &config);

        let handlers = HandlerBus::new();
        let delivered = Arc::new(Mutex::new(Vec::new()));
        for event_type in ["OrderCreated", "PaymentFailed"] {
            let delivered = delivered.clone();
            handlers
                .register_fn(event_type, move |event| {
                    delivered.lock().unwrap().push(event.event_type().to_string());
                    Ok(())
                })
                .unwrap();
        }

        Self {
            store,
            manager,
            bus: TransactionalEventBus::new(handlers),
            broker: Arc::new(InMemoryBroker::new()),
            delivered,
        }
    }

    pub fn relay(&self) -> RelayProcessor<InMemoryOutboxStore, InMemoryBroker> {
        RelayProcessor::new(self.store.clone(), self.broker.clone(), TopicRouter::default())
            .unwrap()
    }

    /// Create an order: business row plus `OrderCreated`, in one transaction.
    pub fn place_order(&self, order_id: &str) -> Result<(), OutboxError> {
        self.manager.run(|tx| {
            tx.put_row(order_id, "created");
            self.bus.publish(order_created(order_id))?;
            Ok(())
        })
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

/// Business failure raised after the event was already published.
#[derive(Debug)]
pub enum PlaceOrderError {
    OutOfStock,
    Outbox(OutboxError),
}

impl From<OutboxError> for PlaceOrderError {
    fn from(err: OutboxError) -> Self {
        PlaceOrderError::Outbox(err)
    }
}

impl From<PublishError> for PlaceOrderError {
    fn from(err: PublishError) -> Self {
        PlaceOrderError::Outbox(err.into())
    }
}
