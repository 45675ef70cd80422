use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::trace;
use uuid::Uuid;

use super::{DistributedLock, LockError};

#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at: Instant,
}

/// In-process lease table.
///
/// Clones share the table and the holder identity; [`replica`](Self::replica)
/// shares the table under a fresh identity, standing in for another instance
/// of the service.
#[derive(Clone)]
pub struct InMemoryLock {
    holder: String,
    leases: Arc<Mutex<HashMap<String, Lease>>>,
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLock {
    pub fn new() -> Self {
        InMemoryLock {
            holder: Uuid::new_v4().to_string(),
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn replica(&self) -> Self {
        InMemoryLock {
            holder: Uuid::new_v4().to_string(),
            leases: Arc::clone(&self.leases),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Whether anyone holds an unexpired lease on `name`.
    pub fn is_held(&self, name: &str) -> Result<bool, LockError> {
        let leases = self
            .leases
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        Ok(leases
            .get(name)
            .is_some_and(|lease| lease.expires_at > Instant::now()))
    }
}

impl DistributedLock for InMemoryLock {
    fn acquire(&self, name: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        let now = Instant::now();
        if let Some(lease) = leases.get(name) {
            if lease.holder != self.holder && lease.expires_at > now {
                trace!(lock = name, "lease held elsewhere");
                return Ok(false);
            }
        }
        leases.insert(
            name.to_string(),
            Lease {
                holder: self.holder.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    fn release(&self, name: &str) -> Result<(), LockError> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        if leases.get(name).is_some_and(|lease| lease.holder == self.holder) {
            leases.remove(name);
        }
        Ok(())
    }
}
