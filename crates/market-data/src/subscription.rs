//! Streaming subscription plumbing shared by all provider adapters.
//!
//! A subscription is a producer task feeding a bounded channel. Dropping
//! the returned [`PriceStream`] aborts the producer, which closes the
//! underlying transport, and releases the process-wide subscription slot
//! exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::PriceUpdate;

/// Hard cap on concurrent streaming subscriptions. Exceeding it is a
/// programming error in the supervision layer and is fatal.
pub const MAX_WEBSOCKET: usize = 2;

/// Bound of the producer -> consumer channel.
pub const LIVE_CHANNEL_CAPACITY: usize = 1024;

static WEBSOCKET_TOTAL: AtomicUsize = AtomicUsize::new(0);

/// Number of currently open streaming subscriptions.
pub fn active_subscriptions() -> usize {
    WEBSOCKET_TOTAL.load(Ordering::SeqCst)
}

/// Claims a subscription slot. Panics when the [`MAX_WEBSOCKET`] cap is
/// exceeded; the slot is released when the token drops.
pub fn register(provider: &'static str) -> SubscriptionToken {
    let previous = WEBSOCKET_TOTAL.fetch_add(1, Ordering::SeqCst);
    if previous >= MAX_WEBSOCKET {
        panic!(
            "websocket subscription limit exceeded: {} already open (max {MAX_WEBSOCKET})",
            previous
        );
    }
    info!(
        "opened streaming subscription for {provider} ({} active)",
        previous + 1
    );
    SubscriptionToken { provider }
}

/// RAII handle on the global subscription counter.
pub struct SubscriptionToken {
    provider: &'static str,
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        let previous = WEBSOCKET_TOTAL.fetch_sub(1, Ordering::SeqCst);
        debug!(
            "released streaming subscription for {} ({} active)",
            self.provider,
            previous.saturating_sub(1)
        );
    }
}

/// Ties the producer task's lifetime to the stream handed to the caller.
pub struct SubscriptionGuard {
    _token: Option<SubscriptionToken>,
    task: JoinHandle<()>,
}

impl SubscriptionGuard {
    pub fn new(token: SubscriptionToken, task: JoinHandle<()>) -> Self {
        Self {
            _token: Some(token),
            task,
        }
    }

    /// Guard without a counter slot, for in-process streams that never
    /// open a transport.
    pub fn untracked(task: JoinHandle<()>) -> Self {
        Self {
            _token: None,
            task,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        // Aborting the producer drops the websocket stream, closing the
        // transport; a producer that already finished is unaffected.
        self.task.abort();
    }
}

/// A cold stream of price updates. The stream ends (`recv` returns
/// `None`) when the provider transport completes or the producer stops.
pub struct PriceStream {
    receiver: mpsc::Receiver<PriceUpdate>,
    _guard: SubscriptionGuard,
}

impl PriceStream {
    pub fn new(receiver: mpsc::Receiver<PriceUpdate>, guard: SubscriptionGuard) -> Self {
        Self {
            receiver,
            _guard: guard,
        }
    }

    pub async fn recv(&mut self) -> Option<PriceUpdate> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_the_stream_releases_the_slot() {
        let before = active_subscriptions();
        let (_tx, rx) = mpsc::channel(4);
        let token = register("test");
        let task = tokio::spawn(async {});
        let stream = PriceStream::new(rx, SubscriptionGuard::new(token, task));
        assert_eq!(active_subscriptions(), before + 1);
        drop(stream);
        assert_eq!(active_subscriptions(), before);
    }

    #[tokio::test]
    async fn stream_ends_when_producer_side_closes() {
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(async {});
        let mut stream = PriceStream::new(rx, SubscriptionGuard::untracked(task));
        drop(tx);
        assert!(stream.recv().await.is_none());
    }
}
