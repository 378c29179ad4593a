//! # Change feed
//!
//! In-process row-change broker implementing [`chat_core::ChangeFeed`]. The message store
//! publishes committed inserts and read-state updates; every subscription whose
//! [`MessageFilter`] matches the row receives the event, in publish order.
//!
//! Each subscription has a bounded buffer. When a subscriber falls behind, events are dropped
//! for it and it later receives [`FeedInterruption::Lagged`] so it can re-derive its state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chat_core::{
    BackendError, ChangeFeed, FeedEvent, FeedInterruption, FeedItem, FeedParseError,
    MessageFilter, Subscription, SubscriptionGuard,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

pub const DEFAULT_CAPACITY: usize = 256;

struct Subscriber {
    filter: MessageFilter,
    tx: mpsc::Sender<FeedItem>,
    dropped: u64,
}

enum Delivery {
    Sent,
    Full,
    Closed,
}

impl Subscriber {
    fn try_deliver(&mut self, item: FeedItem) -> Delivery {
        if self.dropped > 0 {
            match self.tx.try_send(Err(FeedInterruption::Lagged(self.dropped))) {
                Ok(()) => self.dropped = 0,
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    return Delivery::Full;
                }
                Err(TrySendError::Closed(_)) => return Delivery::Closed,
            }
        }
        match self.tx.try_send(item) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Delivery::Full
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

struct BrokerInner {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl BrokerInner {
    fn remove(&self, id: u64) {
        if self.subscribers.lock().remove(&id).is_some() {
            debug!(subscription_id = id, "step: feed subscription released");
        }
    }
}

/// Cheaply cloneable handle to one broker.
#[derive(Clone)]
pub struct FeedBroker {
    inner: Arc<BrokerInner>,
}

impl FeedBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` is the per-subscription buffer size (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers a subscription synchronously.
    pub fn open(&self, filter: MessageFilter) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner.subscribers.lock().insert(
            id,
            Subscriber {
                filter,
                tx,
                dropped: 0,
            },
        );

        let weak: Weak<BrokerInner> = Arc::downgrade(&self.inner);
        let guard = SubscriptionGuard::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        });

        info!(subscription_id = id, filter = %filter, "step: feed subscription opened");
        Subscription::new(filter, rx, guard)
    }

    /// Fans `event` out to matching subscribers. Returns how many received it.
    pub fn publish(&self, event: FeedEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        let mut subscribers = self.inner.subscribers.lock();

        for (id, subscriber) in subscribers.iter_mut() {
            if !subscriber.filter.matches(event.row()) {
                continue;
            }
            match subscriber.try_deliver(Ok(event.clone())) {
                Delivery::Sent => delivered += 1,
                Delivery::Full => {
                    warn!(
                        subscription_id = *id,
                        dropped = subscriber.dropped,
                        "Feed subscriber lagging, event dropped"
                    );
                }
                Delivery::Closed => closed.push(*id),
            }
        }
        for id in closed {
            subscribers.remove(&id);
        }

        debug!(
            kind = event.kind(),
            message_id = event.row().id,
            delivered,
            "Feed event published"
        );
        delivered
    }

    /// Parses a raw backend payload and publishes it. Malformed payloads are logged and rejected.
    pub fn publish_payload(&self, payload: &serde_json::Value) -> Result<usize, FeedParseError> {
        match FeedEvent::from_payload(payload) {
            Ok(event) => Ok(self.publish(event)),
            Err(e) => {
                warn!(error = %e, "Rejected malformed feed payload");
                Err(e)
            }
        }
    }

    /// Tells every live subscriber that events may have been missed (connection re-established).
    pub fn announce_reconnect(&self) {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|_, subscriber| {
            !matches!(
                subscriber.try_deliver(Err(FeedInterruption::Reconnected)),
                Delivery::Closed
            )
        });
        info!(subscribers = subscribers.len(), "step: feed reconnect announced");
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl Default for FeedBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for FeedBroker {
    async fn subscribe(&self, filter: MessageFilter) -> Result<Subscription, BackendError> {
        Ok(self.open(filter))
    }
}
