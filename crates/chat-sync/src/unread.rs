//! Global unread badge for the current identity.
//!
//! The count query is the source of truth; feed events only nudge the cached value between
//! re-initializations. Anything ambiguous (an update without a previous read state, a feed
//! interruption) falls back to a fresh count.
//!
//! A count already covers every event buffered while it ran, so those events are discarded and
//! the count is taken again until it completes with nothing buffered. Recounts run on the feed
//! pump, the only reader of the subscription.

use std::sync::{Arc, Weak};

use chat_core::{
    ChangeFeed, ChatError, FeedEvent, FeedItem, MessageFilter, MessageStore, Result,
    SubscriptionGuard, UserId,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::timeout::with_timeout;

#[derive(Default)]
struct AggState {
    identity: Option<UserId>,
    /// Bumped on every identity change; pumps of an older generation drop their events.
    generation: u64,
    count: u64,
    guard: Option<SubscriptionGuard>,
    pump: Option<JoinHandle<()>>,
    /// Asks the pump for a recount; the sender is answered once it is done.
    recounts: Option<mpsc::UnboundedSender<oneshot::Sender<()>>>,
}

struct Inner {
    store: Arc<dyn MessageStore>,
    feed: Arc<dyn ChangeFeed>,
    config: SyncConfig,
    state: Mutex<AggState>,
    counts: watch::Sender<u64>,
}

/// Single owned unread counter with an explicit identity lifecycle.
///
/// Observers get the count through [`UnreadAggregator::watch`].
pub struct UnreadAggregator {
    inner: Arc<Inner>,
}

enum Adjustment {
    Increment,
    Decrement,
    Refresh,
    Ignore,
}

impl UnreadAggregator {
    pub fn new(store: Arc<dyn MessageStore>, feed: Arc<dyn ChangeFeed>, config: SyncConfig) -> Self {
        let (counts, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                store,
                feed,
                config,
                state: Mutex::new(AggState::default()),
                counts,
            }),
        }
    }

    pub fn count(&self) -> u64 {
        self.inner.state.lock().count
    }

    pub fn identity(&self) -> Option<UserId> {
        self.inner.state.lock().identity
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.inner.counts.subscribe()
    }

    /// Binds the aggregate to `identity`: subscribes to its received messages and loads the count.
    ///
    /// A different identity that is still bound is torn down first. Calling again for the same
    /// identity only refreshes. A failed count keeps the last known value; only a failed
    /// subscription is an error.
    pub async fn initialize(&self, identity: UserId) -> Result<u64> {
        let inner = &self.inner;
        let previous = inner.state.lock().identity;
        match previous {
            Some(current) if current == identity => {
                inner.refresh().await;
                return Ok(self.count());
            }
            Some(current) => self.teardown(current),
            None => {}
        }

        info!(identity, "step: unread aggregate initializing");
        let subscription = with_timeout(
            inner.config.request_timeout,
            inner.feed.subscribe(MessageFilter::ReceivedBy(identity)),
        )
        .await
        .map_err(|e| {
            warn!(identity, error = %e, "Unread feed subscription failed");
            ChatError::Subscription(e.to_string())
        })?;
        let (mut events, guard) = subscription.into_parts();

        let generation = {
            let mut state = inner.state.lock();
            if state.identity.is_some() {
                // Raced with another initialize; keep the binding that won.
                return Err(ChatError::Subscription(format!(
                    "aggregate already bound to another identity while initializing {}",
                    identity
                )));
            }
            state.generation += 1;
            state.identity = Some(identity);
            state.count = 0;
            state.guard = Some(guard);
            state.generation
        };
        inner.counts.send_replace(0);

        inner.recount(generation, &mut events).await;

        let (recounts, mut requests) = mpsc::unbounded_channel::<oneshot::Sender<()>>();
        let weak: Weak<Inner> = Arc::downgrade(inner);
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    item = events.recv() => {
                        let Some(item) = item else { break };
                        let Some(inner) = weak.upgrade() else { break };
                        let needs_recount = match item {
                            Ok(event) => inner.apply_event(generation, identity, &event),
                            Err(interruption) => {
                                warn!(identity, ?interruption, "Unread feed interrupted, recounting");
                                true
                            }
                        };
                        if needs_recount {
                            inner.recount(generation, &mut events).await;
                        }
                    }
                    Some(done) = requests.recv() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.recount(generation, &mut events).await;
                        let _ = done.send(());
                    }
                }
            }
            debug!(identity, "Unread feed stream ended");
        });

        {
            let mut state = inner.state.lock();
            if state.generation == generation {
                state.pump = Some(pump);
                state.recounts = Some(recounts);
            } else {
                pump.abort();
            }
        }

        let count = self.count();
        info!(identity, count, "step: unread aggregate ready");
        Ok(count)
    }

    /// Releases the subscription for `identity` and resets the count to 0.
    /// Does nothing if the aggregate is bound to another identity or none.
    pub fn teardown(&self, identity: UserId) {
        let (guard, pump) = {
            let mut state = self.inner.state.lock();
            if state.identity != Some(identity) {
                return;
            }
            state.identity = None;
            state.generation += 1;
            state.count = 0;
            state.recounts = None;
            (state.guard.take(), state.pump.take())
        };
        if let Some(mut guard) = guard {
            guard.unsubscribe();
        }
        if let Some(pump) = pump {
            pump.abort();
        }
        self.inner.counts.send_replace(0);
        info!(identity, "step: unread aggregate torn down");
    }

    /// Re-derives the count from the store. Keeps the last value if the query fails.
    pub async fn refresh(&self) -> u64 {
        self.inner.refresh().await;
        self.count()
    }

    /// Applies one event for the bound identity.
    pub async fn on_global_feed_event(&self, event: FeedEvent) {
        let (generation, identity) = {
            let state = self.inner.state.lock();
            match state.identity {
                Some(identity) => (state.generation, identity),
                None => return,
            }
        };
        if self.inner.apply_event(generation, identity, &event) {
            self.inner.refresh().await;
        }
    }
}

impl Drop for UnreadAggregator {
    fn drop(&mut self) {
        if let Some(identity) = self.identity() {
            self.teardown(identity);
        }
    }
}

fn classify(identity: UserId, event: &FeedEvent) -> Adjustment {
    let row = event.row();
    if row.receiver_id != identity {
        return Adjustment::Ignore;
    }
    match event {
        FeedEvent::Insert { row } if !row.is_read => Adjustment::Increment,
        FeedEvent::Insert { .. } => Adjustment::Ignore,
        FeedEvent::Update {
            row,
            previous_is_read: Some(previous),
        } => match (*previous, row.is_read) {
            (false, true) => Adjustment::Decrement,
            (true, true) | (false, false) => Adjustment::Ignore,
            (true, false) => Adjustment::Refresh,
        },
        FeedEvent::Update {
            previous_is_read: None,
            ..
        } => Adjustment::Refresh,
    }
}

impl Inner {
    fn set_count(&self, state: &mut AggState, count: u64) {
        state.count = count;
        self.counts.send_replace(count);
    }

    /// Applies an unambiguous event to the cached count. Returns `true` when the event calls
    /// for a recount instead.
    fn apply_event(&self, generation: u64, identity: UserId, event: &FeedEvent) -> bool {
        let adjustment = classify(identity, event);
        let count = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return false;
            }
            let count = match adjustment {
                Adjustment::Ignore => {
                    if event.row().receiver_id != identity {
                        warn!(identity, message_id = event.row().id, "Unread feed delivered another receiver's row");
                    }
                    return false;
                }
                Adjustment::Refresh => {
                    debug!(identity, message_id = event.row().id, "Ambiguous read-state update, recounting");
                    return true;
                }
                Adjustment::Increment => state.count + 1,
                Adjustment::Decrement => state.count.saturating_sub(1),
            };
            self.set_count(&mut state, count);
            count
        };
        debug!(identity, count, kind = event.kind(), "step: unread aggregate adjusted");
        false
    }

    /// Recounts on the pump when one is running, so buffered events are accounted for.
    async fn refresh(&self) {
        let (generation, recounts) = {
            let state = self.state.lock();
            (state.generation, state.recounts.clone())
        };
        if let Some(recounts) = recounts {
            let (done, answered) = oneshot::channel();
            if recounts.send(done).is_ok() && answered.await.is_ok() {
                return;
            }
        }
        self.count_for_generation(generation).await;
    }

    /// Takes the count until it completes with no event buffered behind it. Events buffered
    /// while the count ran are already reflected in it and are discarded. A failed count keeps
    /// the buffer so the pump still applies those events.
    async fn recount(&self, generation: u64, events: &mut mpsc::Receiver<FeedItem>) {
        loop {
            if !self.count_for_generation(generation).await {
                return;
            }
            let mut superseded = 0usize;
            while events.try_recv().is_ok() {
                superseded += 1;
            }
            if superseded == 0 {
                return;
            }
            debug!(superseded, "Feed items arrived during the unread count, counting again");
        }
    }

    /// Returns `true` when a fresh count was stored for `generation`.
    async fn count_for_generation(&self, generation: u64) -> bool {
        let identity = {
            let state = self.state.lock();
            match state.identity {
                Some(identity) if state.generation == generation => identity,
                _ => return false,
            }
        };

        match with_timeout(self.config.request_timeout, self.store.count_unread(identity)).await {
            Ok(count) => {
                let mut state = self.state.lock();
                if state.generation != generation {
                    return false;
                }
                self.set_count(&mut state, count);
                debug!(identity, count, "Unread count refreshed");
                true
            }
            Err(e) => {
                warn!(identity, error = %e, "Unread count failed, keeping last value");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::Message;
    use chrono::Utc;

    fn row(receiver_id: UserId, is_read: bool) -> Message {
        Message {
            id: 7,
            sender_id: 9,
            receiver_id,
            body: "x".to_string(),
            attachment: None,
            created_at: Utc::now(),
            is_read,
        }
    }

    fn update(is_read: bool, previous_is_read: Option<bool>) -> FeedEvent {
        FeedEvent::Update {
            row: row(1, is_read),
            previous_is_read,
        }
    }

    #[test]
    fn test_classify_inserts() {
        assert!(matches!(classify(1, &FeedEvent::Insert { row: row(1, false) }), Adjustment::Increment));
        assert!(matches!(classify(1, &FeedEvent::Insert { row: row(1, true) }), Adjustment::Ignore));
        assert!(matches!(classify(1, &FeedEvent::Insert { row: row(2, false) }), Adjustment::Ignore));
    }

    #[test]
    fn test_classify_updates() {
        assert!(matches!(classify(1, &update(true, Some(false))), Adjustment::Decrement));
        assert!(matches!(classify(1, &update(true, Some(true))), Adjustment::Ignore));
        assert!(matches!(classify(1, &update(false, Some(true))), Adjustment::Refresh));
        assert!(matches!(classify(1, &update(true, None)), Adjustment::Refresh));
    }
}
