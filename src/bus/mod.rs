//! Event bus abstractions.
//!
//! Application code publishes through [`EventBus`]. Wrapping any bus in
//! [`TransactionalEventBus`] makes publishes inside a transaction land in the
//! outbox ledger instead of the inner bus.
//!
//! ```text
//!   business code
//!        │ publish(event)
//!        ▼
//! ┌──────────────────────────┐  ambient tx?  ┌──────────────────────┐
//! │  TransactionalEventBus   │──── yes ─────▶│ deferred list → ledger│
//! └──────────────────────────┘               └──────────────────────┘
//!        │ no
//!        ▼
//! ┌──────────┐ ┌──────────┐ ┌─────────────┐
//! │HandlerBus│ │  LogBus  │ │ EmitterBus  │
//! └──────────┘ └──────────┘ └─────────────┘
//! ```

#[cfg(feature = "emitter")]
mod emitter;
mod event_bus;
mod handler;
mod interceptor;
mod log_bus;

#[cfg(feature = "emitter")]
pub use emitter::EmitterBus;
pub use event_bus::{EventBus, PublishError};
pub use handler::{EventHandler, HandlerBus, HandlerError};
pub use interceptor::TransactionalEventBus;
pub use log_bus::LogBus;
