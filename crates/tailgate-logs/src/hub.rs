//! In-process publish/subscribe hub for log entries.
//!
//! [`LogHub`] fans every published [`LogEntry`] out to all live
//! subscribers. Each subscriber owns an unbounded FIFO queue, so a slow or
//! failed consumer never delays the publisher or its peers; it only grows
//! (and is accounted against) its own queue.
//!
//! The hub is plain data handed to whoever needs it. Construct one in your
//! entry point and clone it into producers and consumers.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;

use crate::types::LogEntry;

/// Soft cap on concurrent subscribers. Exceeding it is logged, never refused.
pub const DEFAULT_SUBSCRIBER_CAP: usize = 100;

type SubscriberId = u64;

struct SubscriberSlot {
    tx: mpsc::UnboundedSender<LogEntry>,
    queued: Arc<AtomicUsize>,
}

struct HubInner {
    subscribers: RwLock<HashMap<SubscriberId, SubscriberSlot>>,
    next_id: AtomicU64,
    soft_cap: usize,
    published: AtomicU64,
    queue_high_water: AtomicUsize,
}

/// Snapshot of hub counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    /// Live subscriber count.
    pub subscribers: usize,
    /// Entries published since the hub was created.
    pub published: u64,
    /// Highest queue depth any subscriber has reached.
    ///
    /// Queues are unbounded; this is the saturation signal to watch when a
    /// consumer stops draining.
    pub queue_high_water: usize,
}

/// Publish/subscribe hub for [`LogEntry`] values.
///
/// Cloning is cheap and shares the subscriber registry.
#[derive(Clone)]
pub struct LogHub {
    inner: Arc<HubInner>,
}

impl LogHub {
    /// Creates a hub with the default subscriber soft cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_soft_cap(DEFAULT_SUBSCRIBER_CAP)
    }

    /// Creates a hub with a custom subscriber soft cap.
    #[must_use]
    pub fn with_soft_cap(soft_cap: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                soft_cap,
                published: AtomicU64::new(0),
                queue_high_water: AtomicUsize::new(0),
            }),
        }
    }

    /// Registers a new subscriber and returns its receiving handle.
    ///
    /// Subscribing never fails. Crossing the soft cap logs a warning so the
    /// operator learns about runaway fan-out, but the subscriber is still
    /// registered.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let count = {
            let mut subscribers = self.inner.subscribers.write();
            subscribers.insert(
                id,
                SubscriberSlot {
                    tx,
                    queued: Arc::clone(&queued),
                },
            );
            subscribers.len()
        };

        if count > self.inner.soft_cap {
            warn!(
                subscribers = count,
                soft_cap = self.inner.soft_cap,
                "subscriber count exceeds soft cap"
            );
        }

        Subscription {
            id,
            rx,
            queued,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Publishes an entry to every live subscriber.
    ///
    /// Delivery is per-subscriber FIFO: each subscriber observes entries in
    /// publication order. Subscribers whose receiving side is gone are
    /// detached. Returns the number of subscribers the entry was queued for.
    ///
    /// This path never logs; it sits underneath the process's own log
    /// stream and must not re-enter it.
    pub fn publish(&self, entry: &LogEntry) -> usize {
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let subscribers = self.inner.subscribers.read();
            for (id, slot) in subscribers.iter() {
                if slot.tx.send(entry.clone()).is_ok() {
                    let depth = slot.queued.fetch_add(1, Ordering::Relaxed) + 1;
                    self.inner.queue_high_water.fetch_max(depth, Ordering::Relaxed);
                    delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.inner.subscribers.write();
            for id in dead {
                subscribers.remove(&id);
            }
        }

        delivered
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscriber_count(),
            published: self.inner.published.load(Ordering::Relaxed),
            queue_high_water: self.inner.queue_high_water.load(Ordering::Relaxed),
        }
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LogHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHub")
            .field("subscribers", &self.subscriber_count())
            .field("soft_cap", &self.inner.soft_cap)
            .finish()
    }
}

/// Receiving handle for one subscriber.
///
/// Dropping the handle unsubscribes. The handle holds only a weak reference
/// to the hub, so it outliving the hub is fine.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<LogEntry>,
    queued: Arc<AtomicUsize>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Receives the next entry, in publication order.
    ///
    /// Returns `None` once the subscription is detached (unsubscribed or
    /// hub dropped) and the queue is drained.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        let entry = self.rx.recv().await;
        if entry.is_some() {
            self.queued.fetch_sub(1, Ordering::Relaxed);
        }
        entry
    }

    /// Detaches this subscriber from the hub.
    ///
    /// Idempotent: calling it twice, or after the hub itself is gone, is a
    /// no-op. Entries already queued can still be received.
    pub fn unsubscribe(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            inner.subscribers.write().remove(&self.id);
        }
        self.hub = Weak::new();
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl Stream for Subscription {
    type Item = LogEntry;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = this.rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &poll {
            this.queued.fetch_sub(1, Ordering::Relaxed);
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;
    use futures::StreamExt;

    fn entry(n: usize) -> LogEntry {
        LogEntry::new(LogLevel::Info, format!("entry {n}"))
    }

    // =========================================================================
    // Delivery Tests
    // =========================================================================

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = LogHub::new();
        assert_eq!(hub.publish(&entry(0)), 0);
        assert_eq!(hub.stats().published, 1);
    }

    #[tokio::test]
    async fn subscriber_sees_entries_in_publication_order() {
        let hub = LogHub::new();
        let mut sub = hub.subscribe();

        for n in 0..100 {
            hub.publish(&entry(n));
        }

        for n in 0..100 {
            let got = sub.recv().await.unwrap();
            assert_eq!(got.message, format!("entry {n}"));
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_entry() {
        let hub = LogHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        for n in 0..10 {
            assert_eq!(hub.publish(&entry(n)), 2);
        }

        for n in 0..10 {
            assert_eq!(a.recv().await.unwrap().message, format!("entry {n}"));
            assert_eq!(b.recv().await.unwrap().message, format!("entry {n}"));
        }
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_others() {
        let hub = LogHub::new();
        let _stalled = hub.subscribe();
        let mut live = hub.subscribe();

        for n in 0..50 {
            hub.publish(&entry(n));
        }

        for n in 0..50 {
            assert_eq!(live.recv().await.unwrap().message, format!("entry {n}"));
        }
        assert!(hub.stats().queue_high_water >= 50);
    }

    #[tokio::test]
    async fn subscription_works_as_stream() {
        let hub = LogHub::new();
        let mut sub = hub.subscribe();

        hub.publish(&entry(1));
        hub.publish(&entry(2));

        assert_eq!(sub.next().await.unwrap().message, "entry 1");
        assert_eq!(sub.next().await.unwrap().message, "entry 2");
    }

    // =========================================================================
    // Lifecycle Tests
    // =========================================================================

    #[tokio::test]
    async fn unsubscribe_stops_future_deliveries() {
        let hub = LogHub::new();
        let mut sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(&entry(0)), 0);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_twice_is_noop() {
        let hub = LogHub::new();
        let mut sub = hub.subscribe();

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_after_hub_dropped_is_noop() {
        let hub = LogHub::new();
        let mut sub = hub.subscribe();
        drop(hub);

        sub.unsubscribe();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn queued_entries_survive_hub_drop() {
        let hub = LogHub::new();
        let mut sub = hub.subscribe();
        hub.publish(&entry(7));
        drop(hub);

        assert_eq!(sub.recv().await.unwrap().message, "entry 7");
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters_it() {
        let hub = LogHub::new();
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn exceeding_soft_cap_still_registers() {
        let hub = LogHub::with_soft_cap(3);
        let subs: Vec<_> = (0..5).map(|_| hub.subscribe()).collect();

        assert_eq!(hub.subscriber_count(), 5);
        assert_eq!(hub.publish(&entry(0)), 5);
        drop(subs);
    }

    #[tokio::test]
    async fn stats_track_published_and_subscribers() {
        let hub = LogHub::new();
        let _sub = hub.subscribe();
        hub.publish(&entry(0));
        hub.publish(&entry(1));

        let stats = hub.stats();
        assert_eq!(stats.subscribers, 1);
        assert_eq!(stats.published, 2);
        assert!(stats.queue_high_water >= 1);
    }
}
