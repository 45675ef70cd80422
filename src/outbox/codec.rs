use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OutboxRecord;
use crate::error::CodecError;
use crate::event::DomainEvent;

/// How a `DomainEvent` is turned into the ledger's opaque payload string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadCodec {
    /// Human-readable JSON envelope.
    #[default]
    Json,
    /// bitcode envelope, base64-encoded so it still fits a text column.
    Compact,
}

// Everything but the aggregate id, which has its own ledger column.
#[derive(Serialize, Deserialize)]
struct Envelope {
    event_id: String,
    event_type: String,
    occurred_at: DateTime<Utc>,
    payload: String,
    metadata: BTreeMap<String, String>,
}

impl PayloadCodec {
    pub fn encode(&self, event: &DomainEvent) -> Result<String, CodecError> {
        let envelope = Envelope {
            event_id: event.event_id().to_string(),
            event_type: event.event_type().to_string(),
            occurred_at: event.occurred_at(),
            payload: event.payload().to_string(),
            metadata: event.all_metadata().clone(),
        };
        match self {
            PayloadCodec::Json => Ok(serde_json::to_string(&envelope)?),
            PayloadCodec::Compact => {
                let bytes = bitcode::serialize(&envelope)?;
                Ok(STANDARD.encode(bytes))
            }
        }
    }

    /// Rebuild the original event from a ledger record.
    pub fn decode(&self, record: &OutboxRecord) -> Result<DomainEvent, CodecError> {
        let envelope: Envelope = match self {
            PayloadCodec::Json => serde_json::from_str(&record.serialized_payload)?,
            PayloadCodec::Compact => {
                let bytes = STANDARD.decode(&record.serialized_payload)?;
                bitcode::deserialize(&bytes)?
            }
        };
        let event_id = Uuid::parse_str(&envelope.event_id)?;
        Ok(DomainEvent::new(
            record.aggregate_id.clone(),
            envelope.event_type,
            envelope.payload,
        )
        .with_event_id(event_id)
        .with_occurred_at(envelope.occurred_at)
        .with_all_metadata(envelope.metadata))
    }
}
