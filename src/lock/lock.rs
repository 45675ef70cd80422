use std::time::Duration;

use super::LockError;

/// A named, lease-based lock shared by every replica of a service.
///
/// Implementations might use Redis `SET NX PX`, Postgres advisory locks or
/// etcd leases. A lease that is not released expires after `ttl`, so a
/// crashed holder cannot block the others forever.
pub trait DistributedLock: Send + Sync {
    /// Try to take the lease on `name` without blocking.
    /// Returns `Ok(true)` if this holder now owns it (re-acquiring refreshes
    /// the lease), `Ok(false)` if another holder does.
    fn acquire(&self, name: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Give the lease back. Releasing a lease this holder does not own is a no-op.
    fn release(&self, name: &str) -> Result<(), LockError>;
}

impl<L: DistributedLock + ?Sized> DistributedLock for std::sync::Arc<L> {
    fn acquire(&self, name: &str, ttl: Duration) -> Result<bool, LockError> {
        (**self).acquire(name, ttl)
    }

    fn release(&self, name: &str) -> Result<(), LockError> {
        (**self).release(name)
    }
}
