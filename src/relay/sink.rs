use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::bus::PublishError;
use crate::outbox::OutboxRecord;

pub const EVENT_ID_HEADER: &str = "eventId";
pub const EVENT_TYPE_HEADER: &str = "eventType";
pub const AGGREGATE_ID_HEADER: &str = "aggregateId";
pub const OUTBOX_ID_HEADER: &str = "outboxId";

/// One message handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    /// Partition key: the aggregate id, so one aggregate's events share a partition.
    pub key: String,
    /// The ledger's serialized payload, unchanged.
    pub payload: String,
    pub headers: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl BrokerMessage {
    pub fn from_record(record: &OutboxRecord, topic: impl Into<String>) -> Self {
        let headers = BTreeMap::from([
            (EVENT_ID_HEADER.to_string(), record.event_id.to_string()),
            (EVENT_TYPE_HEADER.to_string(), record.event_type.clone()),
            (AGGREGATE_ID_HEADER.to_string(), record.aggregate_id.clone()),
            (OUTBOX_ID_HEADER.to_string(), record.id.to_string()),
        ]);
        Self {
            topic: topic.into(),
            key: record.aggregate_id.clone(),
            payload: record.serialized_payload.clone(),
            headers,
            timestamp: record.created_at,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Broker acknowledgement for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

/// The broker client seen by the relay.
///
/// `send` resolves once the broker acknowledges or rejects the message.
#[async_trait]
pub trait BrokerSink: Send + Sync {
    async fn send(&self, message: BrokerMessage) -> Result<DeliveryReceipt, PublishError>;
}

#[async_trait]
impl<K: BrokerSink + ?Sized> BrokerSink for Arc<K> {
    async fn send(&self, message: BrokerMessage) -> Result<DeliveryReceipt, PublishError> {
        (**self).send(message).await
    }
}

type FailWhen = Arc<dyn Fn(&BrokerMessage) -> bool + Send + Sync>;

/// In-memory broker for tests and single-process setups.
///
/// Accepted messages are appended to a shared log; `Clone` returns another
/// handle to the same log. Rejections and ack latency can be injected.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    log: Arc<RwLock<Vec<BrokerMessage>>>,
    offsets: Arc<Mutex<HashMap<String, u64>>>,
    fail_when: Arc<RwLock<Option<FailWhen>>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every message matching `predicate`.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&BrokerMessage) -> bool + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.fail_when.write() {
            *slot = Some(Arc::new(predicate));
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut slot) = self.fail_when.write() {
            *slot = None;
        }
    }

    /// Delay every acknowledgement by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.write() {
            *slot = latency;
        }
    }

    pub fn messages(&self) -> Vec<BrokerMessage> {
        self.log.read().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn messages_for(&self, topic: &str) -> Vec<BrokerMessage> {
        self.log
            .read()
            .map(|log| log.iter().filter(|m| m.topic == topic).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.log.read().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rejects(&self, message: &BrokerMessage) -> bool {
        self.fail_when
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .is_some_and(|predicate| predicate(message))
    }
}

#[async_trait]
impl BrokerSink for InMemoryBroker {
    async fn send(&self, message: BrokerMessage) -> Result<DeliveryReceipt, PublishError> {
        let latency = self.latency.read().ok().and_then(|slot| *slot);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.rejects(&message) {
            return Err(PublishError::Rejected(format!(
                "broker refused message for {}",
                message.topic
            )));
        }

        let offset = {
            let mut offsets = self
                .offsets
                .lock()
                .map_err(|_| PublishError::Poisoned("broker offsets"))?;
            let next = offsets.entry(message.topic.clone()).or_insert(0);
            let offset = *next;
            *next += 1;
            offset
        };
        let receipt = DeliveryReceipt {
            topic: message.topic.clone(),
            partition: 0,
            offset,
        };
        self.log
            .write()
            .map_err(|_| PublishError::Poisoned("broker log"))?
            .push(message);
        Ok(receipt)
    }
}
