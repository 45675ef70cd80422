//! Unit of work with before-commit hooks and an ambient (per-context)
//! deferred-event list.
//!
//! A [`Transaction`] wraps the store's transactional handle. While code runs
//! inside [`Transaction::scope`] (sync) or [`Transaction::scope_async`], the
//! transaction is *ambient*: [`ambient::current`] returns its deferred-event
//! list, which is how the transactional bus knows to capture instead of
//! deliver. On commit every registered [`BeforeCommit`] hook runs with the
//! same handle, so hook writes land in the same transaction as the business
//! writes.

pub mod ambient;
mod unit_of_work;

pub use ambient::DeferredEvents;
pub use unit_of_work::{BeforeCommit, Transaction, TransactionManager};
