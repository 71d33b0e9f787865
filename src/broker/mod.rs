//! Notification broker: per-user fan-out of insights to live subscribers.
//!
//! A user may hold several simultaneous subscriptions (two browser tabs are
//! two subscribers). Delivery is non-blocking: a subscriber whose bounded
//! buffer is full simply misses that insight and a drop counter ticks.
//! Slow consumers never stall the publisher, and the insight remains
//! retrievable from the durable store regardless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::insights::Insight;

/// Counters exposed by [`NotificationBroker::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    /// Insights handed to subscriber buffers.
    pub delivered: u64,
    /// Deliveries dropped because a buffer was full.
    pub dropped: u64,
    /// Currently registered subscribers, across all users.
    pub subscribers: usize,
}

#[derive(Debug)]
struct SubscriberHandle {
    id: u64,
    tx: mpsc::Sender<Insight>,
}

/// A live subscription to a user's insights.
///
/// Dropping the receiver is not enough to free the broker-side slot; call
/// [`NotificationBroker::unsubscribe`] when the stream closes (closed
/// channels are also pruned lazily on publish).
#[derive(Debug)]
pub struct Subscription {
    /// The subscribed user.
    pub user_id: i64,
    /// Broker-assigned subscriber id, needed to unsubscribe.
    pub subscriber_id: u64,
    /// Receiving end of the bounded delivery buffer.
    pub receiver: mpsc::Receiver<Insight>,
}

/// Mutex-protected subscriber table with non-blocking publish.
#[derive(Debug)]
pub struct NotificationBroker {
    subscribers: Mutex<HashMap<i64, Vec<SubscriberHandle>>>,
    buffer_capacity: usize,
    next_id: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl NotificationBroker {
    /// Create a broker whose subscriber buffers hold `buffer_capacity`
    /// insights.
    #[must_use]
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer_capacity: buffer_capacity.max(1),
            next_id: AtomicU64::new(1),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber for `user_id`.
    pub fn subscribe(&self, user_id: i64) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_table()
            .entry(user_id)
            .or_default()
            .push(SubscriberHandle { id, tx });
        tracing::debug!(user_id, subscriber_id = id, "subscriber registered");
        Subscription {
            user_id,
            subscriber_id: id,
            receiver: rx,
        }
    }

    /// Remove one subscriber; the user's other subscriptions are untouched.
    pub fn unsubscribe(&self, user_id: i64, subscriber_id: u64) {
        let mut table = self.lock_table();
        if let Some(handles) = table.get_mut(&user_id) {
            handles.retain(|h| h.id != subscriber_id);
            if handles.is_empty() {
                table.remove(&user_id);
            }
        }
        tracing::debug!(user_id, subscriber_id, "subscriber removed");
    }

    /// Fan an insight out to every subscriber of its user.
    ///
    /// Never blocks: full buffers drop the delivery and tick the drop
    /// counter; closed subscribers are pruned.
    pub fn publish(&self, insight: &Insight) {
        let mut delivered = 0u64;
        let mut dropped = 0u64;

        {
            let mut table = self.lock_table();
            if let Some(handles) = table.get_mut(&insight.user_id) {
                handles.retain(|handle| match handle.tx.try_send(insight.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        dropped += 1;
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
                if handles.is_empty() {
                    table.remove(&insight.user_id);
                }
            }
        }

        self.delivered.fetch_add(delivered, Ordering::Relaxed);
        if dropped > 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
            tracing::debug!(
                user_id = insight.user_id,
                insight_id = insight.id,
                dropped,
                "insight dropped for slow subscribers"
            );
        }
    }

    /// Current counters.
    pub fn stats(&self) -> BrokerStats {
        let subscribers = self.lock_table().values().map(Vec::len).sum();
        BrokerStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            subscribers,
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<i64, Vec<SubscriberHandle>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("subscriber table lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
