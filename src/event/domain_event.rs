use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::error::CodecError;

/// Metadata key used for correlation IDs.
pub const CORRELATION_ID_KEY: &str = "correlationId";

/// A strongly-typed event that can be carried inside a [`DomainEvent`].
///
/// The `EVENT_TYPE` tag is what routes and decodes the event; it must be
/// unique per payload shape.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct OrderCreated { order_id: String, total: u64 }
///
/// impl TypedEvent for OrderCreated {
///     const EVENT_TYPE: &'static str = "OrderCreated";
///     fn aggregate_id(&self) -> String { self.order_id.clone() }
/// }
///
/// let event = DomainEvent::from_typed(&OrderCreated { .. })?;
/// ```
pub trait TypedEvent: Serialize + DeserializeOwned {
    const EVENT_TYPE: &'static str;

    /// Identifier of the business entity this event belongs to.
    fn aggregate_id(&self) -> String;
}

/// Immutable description of a business fact.
///
/// Identity is the `event_id` alone: two events with the same id compare
/// equal and hash the same whatever their other fields hold.
#[derive(Clone, Debug)]
pub struct DomainEvent {
    aggregate_id: String,
    event_id: Uuid,
    occurred_at: DateTime<Utc>,
    event_type: String,
    payload: String,
    metadata: BTreeMap<String, String>,
}

impl DomainEvent {
    /// Create a new event with a fresh `event_id` and the current time.
    pub fn new(
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event_type: event_type.into(),
            payload: payload.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create an event from a typed payload, JSON-encoding it.
    pub fn from_typed<E: TypedEvent>(event: &E) -> Result<Self, CodecError> {
        let payload = serde_json::to_string(event)?;
        Ok(Self::new(event.aggregate_id(), E::EVENT_TYPE, payload))
    }

    /// Decode the payload back into its typed form.
    ///
    /// Fails with [`CodecError::TypeMismatch`] when the tag does not match
    /// `E::EVENT_TYPE`.
    pub fn decode<E: TypedEvent>(&self) -> Result<E, CodecError> {
        if self.event_type != E::EVENT_TYPE {
            return Err(CodecError::TypeMismatch {
                expected: E::EVENT_TYPE,
                actual: self.event_type.clone(),
            });
        }
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Override the generated event id (used when rebuilding from the ledger).
    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Attach a metadata entry (trace context, tenant, etc.).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Self {
        self.with_metadata(CORRELATION_ID_KEY, correlation_id)
    }

    pub(crate) fn with_all_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn all_metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata(CORRELATION_ID_KEY)
    }
}

impl PartialEq for DomainEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for DomainEvent {}

impl Hash for DomainEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.event_id.hash(state);
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(eventId={}, aggregateId={})",
            self.event_type, self.event_id, self.aggregate_id
        )
    }
}
