use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::{OutboxRecord, OutboxStatus, OutboxStore, RecordId, StoreError, Transactional};

/// Staging area for one in-memory transaction.
///
/// Business rows and outbox records written here become visible together on
/// commit, or vanish together on rollback/drop.
#[derive(Debug, Default)]
pub struct InMemoryTx {
    records: Vec<OutboxRecord>,
    rows: Vec<(String, String)>,
}

impl InMemoryTx {
    /// Stage a business row (stands in for the aggregate write).
    pub fn put_row(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.rows.push((key.into(), value.into()));
    }

    pub fn staged_records(&self) -> &[OutboxRecord] {
        &self.records
    }
}

/// In-memory ledger for tests and single-process use.
///
/// `Clone` hands out another handle to the same storage, the way
/// `HashMapRepository` shares its maps across worker threads.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    ledger: Arc<RwLock<BTreeMap<RecordId, OutboxRecord>>>,
    rows: Arc<RwLock<HashMap<String, String>>>,
    fail_saves: Arc<AtomicBool>,
    fail_queries: Arc<AtomicBool>,
    fail_updates: Arc<AtomicBool>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail with a backend error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent pending-record query fail with a backend error.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `update_status` fail with a backend error.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Insert an already-committed record, bypassing transactions.
    pub fn insert_committed(&self, record: OutboxRecord) -> Result<(), StoreError> {
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox write"))?;
        if ledger.contains_key(&record.id) {
            return Err(StoreError::Duplicate { id: record.id });
        }
        ledger.insert(record.id, record);
        Ok(())
    }

    pub fn get(&self, id: RecordId) -> Result<Option<OutboxRecord>, StoreError> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(ledger.get(&id).cloned())
    }

    /// All records, ascending by id.
    pub fn all(&self) -> Result<Vec<OutboxRecord>, StoreError> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(ledger.values().cloned().collect())
    }

    pub fn find_by_status(&self, status: OutboxStatus) -> Result<Vec<OutboxRecord>, StoreError> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(ledger
            .values()
            .filter(|record| record.status == status)
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.ledger.read().map(|ledger| ledger.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed business row, if any.
    pub fn row(&self, key: &str) -> Option<String> {
        self.rows
            .read()
            .ok()
            .and_then(|rows| rows.get(key).cloned())
    }
}

impl Transactional for InMemoryOutboxStore {
    type Tx = InMemoryTx;

    fn begin(&self) -> Result<InMemoryTx, StoreError> {
        Ok(InMemoryTx::default())
    }

    fn commit(&self, tx: InMemoryTx) -> Result<(), StoreError> {
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox write"))?;
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::LockPoisoned("rows write"))?;

        if let Some(existing) = tx.records.iter().find(|r| ledger.contains_key(&r.id)) {
            return Err(StoreError::Duplicate { id: existing.id });
        }

        for record in tx.records {
            ledger.insert(record.id, record);
        }
        rows.extend(tx.rows);

        Ok(())
    }

    fn rollback(&self, tx: InMemoryTx) -> Result<(), StoreError> {
        drop(tx);
        Ok(())
    }
}

impl OutboxStore for InMemoryOutboxStore {
    fn save(&self, tx: &mut InMemoryTx, record: OutboxRecord) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("save rejected".into()));
        }
        tx.records.push(record);
        Ok(())
    }

    fn find_pending_events_after_id(
        &self,
        cursor: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("query rejected".into()));
        }
        let ledger = self
            .ledger
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        let lower = match cursor {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        Ok(ledger
            .range((lower, Bound::Unbounded))
            .map(|(_, record)| record)
            .filter(|record| record.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_status(&self, id: RecordId, status: OutboxStatus) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("update rejected".into()));
        }
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox write"))?;
        let record = ledger.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.transition_to(status)?;
        Ok(())
    }

    fn last_processed_event_id(&self) -> Result<Option<RecordId>, StoreError> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(ledger
            .values()
            .rev()
            .find(|record| !record.is_pending())
            .map(|record| record.id))
    }
}
