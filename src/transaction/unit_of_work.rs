use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::ambient::{self, DeferredEvents};
use crate::error::OutboxError;
use crate::event::DomainEvent;
use crate::outbox::Transactional;

/// Callback run immediately before a transaction commits.
///
/// Hooks receive the same transactional handle the business code wrote
/// through. An error aborts the commit and rolls the transaction back.
pub trait BeforeCommit<Tx>: Send + Sync {
    fn before_commit(&self, tx: &mut Tx, deferred: &[DomainEvent]) -> Result<(), OutboxError>;
}

/// Opens transactions against a store and attaches the registered hooks.
pub struct TransactionManager<S: Transactional> {
    store: Arc<S>,
    hooks: Vec<Arc<dyn BeforeCommit<S::Tx>>>,
}

impl<S: Transactional> Clone for TransactionManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            hooks: self.hooks.clone(),
        }
    }
}

impl<S: Transactional> TransactionManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            hooks: Vec::new(),
        }
    }

    /// Register a hook run (in registration order) before every commit.
    pub fn with_hook(mut self, hook: impl BeforeCommit<S::Tx> + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn begin(&self) -> Result<Transaction<S>, OutboxError> {
        let handle = self.store.begin()?;
        Ok(Transaction {
            store: Arc::clone(&self.store),
            handle,
            deferred: DeferredEvents::new(),
            hooks: self.hooks.clone(),
        })
    }

    /// Run `work` as an ambient transaction; commit on `Ok`, roll back on `Err`.
    pub fn run<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut S::Tx) -> Result<T, E>,
        E: From<OutboxError>,
    {
        let mut tx = self.begin()?;
        match tx.scope(work) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback()?;
                Err(err)
            }
        }
    }

    /// Async counterpart of [`run`](Self::run).
    ///
    /// ```ignore
    /// manager
    ///     .run_async(|tx| Box::pin(async move {
    ///         tx.put_row("order-1", "created");
    ///         bus.publish_async(event).await?;
    ///         Ok::<_, OutboxError>(())
    ///     }))
    ///     .await?;
    /// ```
    pub async fn run_async<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut S::Tx) -> BoxFuture<'a, Result<T, E>>,
        E: From<OutboxError>,
    {
        let mut tx = self.begin()?;
        match tx.scope_async(work).await {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback()?;
                Err(err)
            }
        }
    }
}

/// An open unit of work.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// its handle, which the store treats as a rollback.
pub struct Transaction<S: Transactional> {
    store: Arc<S>,
    handle: S::Tx,
    deferred: DeferredEvents,
    hooks: Vec<Arc<dyn BeforeCommit<S::Tx>>>,
}

impl<S: Transactional> Transaction<S> {
    pub fn handle_mut(&mut self) -> &mut S::Tx {
        &mut self.handle
    }

    /// Events captured so far, waiting for commit.
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Run `work` with this transaction ambient on the current thread.
    ///
    /// Only code that runs before `work` returns is inside the scope. A
    /// future built here and awaited later publishes outside it, straight to
    /// the inner bus; async callers use [`scope_async`](Self::scope_async) or
    /// [`TransactionManager::run_async`].
    pub fn scope<R>(&mut self, work: impl FnOnce(&mut S::Tx) -> R) -> R {
        let _guard = ambient::enter(self.deferred.clone());
        work(&mut self.handle)
    }

    /// Run `work` with this transaction ambient on the current task.
    pub async fn scope_async<'a, F, Fut, R>(&'a mut self, work: F) -> R
    where
        F: FnOnce(&'a mut S::Tx) -> Fut,
        Fut: Future<Output = R> + 'a,
    {
        let deferred = self.deferred.clone();
        ambient::scope(deferred, work(&mut self.handle)).await
    }

    /// Run the before-commit hooks, then commit.
    ///
    /// If any hook fails the transaction is rolled back and the hook's error
    /// is returned: business writes and captured events commit together or
    /// not at all. Deferred events with no hook registered to take them are
    /// an [`OutboxError::Uncaptured`] error and roll the transaction back too.
    pub fn commit(self) -> Result<(), OutboxError> {
        let Transaction {
            store,
            mut handle,
            deferred,
            hooks,
        } = self;
        let events = deferred.take();

        if hooks.is_empty() && !events.is_empty() {
            warn!(deferred = events.len(), "events deferred without an outbox writer, rolling back");
            if let Err(rollback_err) = store.rollback(handle) {
                warn!(error = %rollback_err, "rollback after uncaptured events failed");
            }
            return Err(OutboxError::Uncaptured(events.len()));
        }

        for hook in &hooks {
            if let Err(err) = hook.before_commit(&mut handle, &events) {
                warn!(error = %err, deferred = events.len(), "before-commit hook failed, rolling back");
                if let Err(rollback_err) = store.rollback(handle) {
                    warn!(error = %rollback_err, "rollback after hook failure failed");
                }
                return Err(err);
            }
        }

        store.commit(handle)?;
        debug!(captured = events.len(), "transaction committed");
        Ok(())
    }

    /// Discard the transaction and every event deferred inside it.
    pub fn rollback(self) -> Result<(), OutboxError> {
        let dropped = self.deferred.take().len();
        self.store.rollback(self.handle)?;
        debug!(dropped, "transaction rolled back");
        Ok(())
    }
}
