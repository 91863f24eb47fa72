//! Event bus: fan-out of SwarmEvents with bounded per-subscriber queues.
//!
//! Publication never blocks a turn: `publish` drops on a full queue and
//! counts the drop, warning periodically. Events that must not be lost
//! (state changes, errors) go through `publish_blocking`, which waits up to
//! a timeout per subscriber and reports whether everyone received.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use zoea_core::SwarmEvent;

/// Minimum per-subscriber queue length.
const MIN_BUFFER: usize = 16;

/// Warn once per this many drops on a subscriber.
const DROP_LOG_EVERY: u64 = 100;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<SwarmEvent>,
    dropped: AtomicU64,
}

/// A subscriber's read side. Dropping it ends the subscription; the bus
/// suppresses sends to closed queues.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<SwarmEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<SwarmEvent> {
        self.rx.recv().await
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with at least `MIN_BUFFER` queued events.
    pub fn subscribe(&self, buffer: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer.max(MIN_BUFFER));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subscribers.write().expect("subscriber lock poisoned");
        subs.push(Subscriber {
            id,
            tx,
            dropped: AtomicU64::new(0),
        });
        Subscription { id, rx }
    }

    /// Remove a subscriber. Idempotent.
    pub fn unsubscribe(&self, id: u64) {
        let mut subs = self.subscribers.write().expect("subscriber lock poisoned");
        subs.retain(|s| s.id != id);
    }

    /// Drop every subscriber. Idempotent; receivers observe end-of-stream.
    pub fn close(&self) {
        let mut subs = self.subscribers.write().expect("subscriber lock poisoned");
        subs.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("subscriber lock poisoned").len()
    }

    /// Offer the event to every subscriber without blocking. Full queues
    /// drop the event and count it.
    pub fn publish(&self, event: SwarmEvent) {
        let subs = self.subscribers.read().expect("subscriber lock poisoned");
        for sub in subs.iter() {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped % DROP_LOG_EVERY == 1 {
                        warn!(
                            subscriber = sub.id,
                            dropped, "event subscriber queue full, dropping"
                        );
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Receiver gone; cleaned up on the next unsubscribe/close.
                }
            }
        }
    }

    /// Deliver the event to every subscriber, waiting up to `timeout` per
    /// subscriber. Returns whether all live subscribers received it.
    pub async fn publish_blocking(&self, event: SwarmEvent, timeout: Duration) -> bool {
        let senders: Vec<(u64, mpsc::Sender<SwarmEvent>)> = {
            let subs = self.subscribers.read().expect("subscriber lock poisoned");
            subs.iter().map(|s| (s.id, s.tx.clone())).collect()
        };

        let mut all_delivered = true;
        for (id, tx) in senders {
            match tokio::time::timeout(timeout, tx.send(event.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    // Closed subscriber; suppressed.
                }
                Err(_) => {
                    warn!(subscriber = id, "blocking publish timed out");
                    all_delivered = false;
                }
            }
        }
        all_delivered
    }

    /// Total events dropped for a subscriber (0 for unknown ids).
    pub fn dropped_count(&self, id: u64) -> u64 {
        let subs = self.subscribers.read().expect("subscriber lock poisoned");
        subs.iter()
            .find(|s| s.id == id)
            .map(|s| s.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
