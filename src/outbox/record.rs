use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreError;

/// Ledger row identifier.
///
/// Backed by a UUIDv7, so ids generated in one process sort in generation
/// order. The relay cursor relies on this total order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn generate() -> Self {
        RecordId(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        RecordId(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Processed,
    Failed,
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboxStatus::Pending => write!(f, "PENDING"),
            OutboxStatus::Processed => write!(f, "PROCESSED"),
            OutboxStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Durable domain event awaiting (or past) relay to the broker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: RecordId,
    /// Id of the `DomainEvent` this row was captured from.
    pub event_id: Uuid,
    pub aggregate_id: String,
    pub event_type: String,
    pub serialized_payload: String,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

impl OutboxRecord {
    pub fn pending(
        id: RecordId,
        event_id: Uuid,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        serialized_payload: impl Into<String>,
    ) -> Self {
        OutboxRecord {
            id,
            event_id,
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            serialized_payload: serialized_payload.into(),
            status: OutboxStatus::Pending,
            created_at: Utc::now(),
            processed_at: None,
            retry_count: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    /// Move out of `Pending` into `Processed`. Returns whether anything changed.
    pub fn mark_processed(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = OutboxStatus::Processed;
        self.processed_at = Some(Utc::now());
        true
    }

    /// Move out of `Pending` into `Failed`, counting the failed attempt.
    pub fn mark_failed(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = OutboxStatus::Failed;
        self.processed_at = Some(Utc::now());
        self.retry_count = self.retry_count.saturating_add(1);
        true
    }

    /// Apply a status update coming through the store contract.
    ///
    /// Re-applying the status the record already holds is a no-op
    /// (`Ok(false)`); leaving a terminal status is rejected.
    pub fn transition_to(&mut self, status: OutboxStatus) -> Result<bool, StoreError> {
        if self.status == status {
            return Ok(false);
        }
        let changed = match status {
            OutboxStatus::Processed => self.mark_processed(),
            OutboxStatus::Failed => self.mark_failed(),
            OutboxStatus::Pending => false,
        };
        if changed {
            Ok(true)
        } else {
            Err(StoreError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: status,
            })
        }
    }
}
