//! Ambient transaction tracking.
//!
//! Sync scopes live on a thread-local stack; async scopes use a tokio
//! task-local so the scope follows the task across worker threads.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use crate::event::DomainEvent;

/// Events published while a transaction was ambient, waiting for commit.
#[derive(Clone, Debug, Default)]
pub struct DeferredEvents(Arc<Mutex<Vec<DomainEvent>>>);

impl DeferredEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: DomainEvent) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Drain the list, leaving it empty.
    pub fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

thread_local! {
    static SCOPES: RefCell<Vec<DeferredEvents>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static TASK_SCOPE: DeferredEvents;
}

/// The deferred-event list of the innermost ambient transaction, if any.
pub fn current() -> Option<DeferredEvents> {
    SCOPES
        .with(|scopes| scopes.borrow().last().cloned())
        .or_else(|| TASK_SCOPE.try_with(DeferredEvents::clone).ok())
}

pub fn is_active() -> bool {
    current().is_some()
}

/// Pops the thread-local scope on drop. Not `Send`: it must be dropped on
/// the thread that entered it.
pub(crate) struct ScopeGuard {
    _not_send: PhantomData<*const ()>,
}

pub(crate) fn enter(deferred: DeferredEvents) -> ScopeGuard {
    SCOPES.with(|scopes| scopes.borrow_mut().push(deferred));
    ScopeGuard {
        _not_send: PhantomData,
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPES.with(|scopes| {
            scopes.borrow_mut().pop();
        });
    }
}

pub(crate) async fn scope<F: Future>(deferred: DeferredEvents, fut: F) -> F::Output {
    TASK_SCOPE.scope(deferred, fut).await
}
