use thiserror::Error;

use crate::bus::PublishError;
use crate::lock::LockError;
use crate::outbox::StoreError;

/// Failure turning an event into its ledger form, or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bitcode codec error: {0}")]
    Bitcode(#[from] bitcode::Error),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid event id in ledger payload: {0}")]
    EventId(#[from] uuid::Error),
    #[error("event type mismatch (expected {expected}, got {actual})")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },
}

/// Top-level error for transaction commits and relay ticks.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Events were published inside a transaction that has no before-commit
    /// hook to capture them.
    #[error("{0} event(s) published in a transaction with no outbox writer")]
    Uncaptured(usize),
}
