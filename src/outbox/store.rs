use thiserror::Error;

use super::{OutboxRecord, OutboxStatus, RecordId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ledger lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("outbox record {0} not found")]
    NotFound(RecordId),
    #[error("outbox record {id} already exists")]
    Duplicate { id: RecordId },
    #[error("outbox record {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: RecordId,
        from: OutboxStatus,
        to: OutboxStatus,
    },
    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// A store that can open a unit of work spanning business data and ledger rows.
///
/// `Tx` is the backend's transactional handle (an in-memory staging area,
/// a database transaction, ...). Dropping a `Tx` without committing must
/// discard everything written through it.
pub trait Transactional: Send + Sync {
    type Tx: Send;

    fn begin(&self) -> Result<Self::Tx, StoreError>;

    fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;
}

/// Durable append-only ledger of outbox records.
///
/// Implementations must allow concurrent `update_status` calls for distinct
/// ids without cross-record locking.
pub trait OutboxStore: Transactional {
    /// Persist a record inside the caller's transaction.
    ///
    /// The record only becomes visible to readers once `tx` commits.
    fn save(&self, tx: &mut Self::Tx, record: OutboxRecord) -> Result<(), StoreError>;

    /// Up to `limit` pending records, ascending by id.
    fn find_pending_events(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        self.find_pending_events_after_id(None, limit)
    }

    /// Up to `limit` pending records with `id > cursor`, ascending by id.
    /// A `None` cursor means "from the start of the ledger".
    fn find_pending_events_after_id(
        &self,
        cursor: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, StoreError>;

    /// Move a record out of `Pending`, stamping `processed_at`.
    ///
    /// Repeating the status a record already holds is a no-op.
    fn update_status(&self, id: RecordId, status: OutboxStatus) -> Result<(), StoreError>;

    /// Highest id known to have left `Pending`, used to seed the relay cursor.
    fn last_processed_event_id(&self) -> Result<Option<RecordId>, StoreError>;
}
