//! Background relay loop.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{BrokerSink, RelayProcessor};
use crate::config::OutboxConfig;
use crate::outbox::OutboxStore;

/// Counters collected by a relay loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub ticks: usize,
    /// Ticks that found the relay lock held by another instance.
    pub skipped_ticks: usize,
    /// Ticks that ended with an error or a panic.
    pub failed_ticks: usize,
    /// Records handed to the sink.
    pub dispatched: usize,
}

/// A relay processor running on a tokio task.
///
/// Ticks run back to back with `interval` between the end of one and the
/// start of the next, so they never overlap. A tick that fails or panics is
/// logged and counted; the loop keeps going. Dropping the handle stops the
/// loop at its next pause. A lock-gated processor keeps its lease for the
/// life of the loop and releases it on the way out.
///
/// ```ignore
/// let relay = RelayHandle::spawn(processor, Duration::from_secs(1));
/// // ...
/// let stats = relay.stop().await;
/// ```
pub struct RelayHandle {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<RelayStats>,
}

impl RelayHandle {
    pub fn spawn<S, K>(mut processor: RelayProcessor<S, K>, interval: Duration) -> Self
    where
        S: OutboxStore + 'static,
        K: BrokerSink + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "outbox relay started");
            let mut stats = RelayStats::default();

            loop {
                if *stop_rx.borrow() {
                    break;
                }

                stats.ticks += 1;
                match AssertUnwindSafe(processor.tick()).catch_unwind().await {
                    Ok(Ok(report)) if report.skipped => stats.skipped_ticks += 1,
                    Ok(Ok(report)) => stats.dispatched += report.dispatched(),
                    Ok(Err(err)) => {
                        stats.failed_ticks += 1;
                        error!(error = %err, "outbox relay tick failed");
                    }
                    Err(_) => {
                        stats.failed_ticks += 1;
                        error!("outbox relay tick panicked");
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = stop_rx.changed() => {
                        // Handle dropped.
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            processor.release_lock();
            info!(
                ticks = stats.ticks,
                dispatched = stats.dispatched,
                failed_ticks = stats.failed_ticks,
                "outbox relay stopped"
            );
            stats
        });

        Self { stop_tx, handle }
    }

    /// Spawn with the polling interval from `config`, or `None` when the
    /// outbox or its relay is disabled.
    pub fn from_config<S, K>(processor: RelayProcessor<S, K>, config: &OutboxConfig) -> Option<Self>
    where
        S: OutboxStore + 'static,
        K: BrokerSink + 'static,
    {
        if !config.relay_enabled() {
            info!("outbox relay disabled");
            return None;
        }
        Some(Self::spawn(processor, config.relay.polling_interval()))
    }

    /// Ask the loop to stop after the current tick, without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the loop and wait for it. Deliveries already dispatched keep
    /// running on their own tasks.
    pub async fn stop(self) -> RelayStats {
        self.signal_stop();
        self.handle.await.unwrap_or_default()
    }
}
