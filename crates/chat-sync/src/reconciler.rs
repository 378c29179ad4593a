//! Conversation reconciler: one open conversation's message log.
//!
//! All log mutations (optimistic appends, insert results, feed events, re-fetches) go through
//! one async mutex, so they are applied one at a time and in arrival order. Feed events are
//! pumped by a single task per open conversation. Views observe the log through a
//! [`watch`] channel of [`ConversationSnapshot`]s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chat_core::{
    Attachment, Blob, ChangeFeed, ChatError, ConversationKey, FeedEvent, FeedInterruption,
    Message, MessageFilter, MessageId, MessageStore, NewMessage, Result, SubscriptionGuard, UserId,
};
use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::attachment::AttachmentPipeline;
use crate::config::SyncConfig;
use crate::log::{ConversationLog, LogEntry, UpdateOutcome};
use crate::matching::PendingMessage;
use crate::timeout::with_timeout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationStatus {
    /// Created, `open` not called yet.
    Idle,
    Loading,
    Live,
    /// Re-fetching after a feed interruption.
    Resyncing,
    /// Last fetch failed; the log may be behind the store.
    Stale(String),
    Closed,
}

/// What a conversation view renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub key: ConversationKey,
    pub entries: Vec<LogEntry>,
    pub status: ConversationStatus,
}

struct ReconcilerState {
    log: ConversationLog,
    status: ConversationStatus,
}

#[derive(Default)]
struct Lifecycle {
    closed: bool,
    guard: Option<SubscriptionGuard>,
    pump: Option<JoinHandle<()>>,
}

struct Inner {
    me: UserId,
    partner: UserId,
    key: ConversationKey,
    store: Arc<dyn MessageStore>,
    feed: Arc<dyn ChangeFeed>,
    config: SyncConfig,
    state: Mutex<ReconcilerState>,
    lifecycle: SyncMutex<Lifecycle>,
    next_seq: AtomicU64,
    snapshots: watch::Sender<ConversationSnapshot>,
    read_marks: SyncMutex<Vec<JoinHandle<()>>>,
}

/// Owns the message log of the conversation between `me` and `partner`.
///
/// Dropping the reconciler closes it.
pub struct ConversationReconciler {
    inner: Arc<Inner>,
}

impl ConversationReconciler {
    pub fn new(
        me: UserId,
        partner: UserId,
        store: Arc<dyn MessageStore>,
        feed: Arc<dyn ChangeFeed>,
        config: SyncConfig,
    ) -> Self {
        let key = ConversationKey::new(me, partner);
        let (snapshots, _) = watch::channel(ConversationSnapshot {
            key,
            entries: Vec::new(),
            status: ConversationStatus::Idle,
        });
        let log = ConversationLog::new(config.match_window);

        Self {
            inner: Arc::new(Inner {
                me,
                partner,
                key,
                store,
                feed,
                config,
                state: Mutex::new(ReconcilerState {
                    log,
                    status: ConversationStatus::Idle,
                }),
                lifecycle: SyncMutex::new(Lifecycle::default()),
                next_seq: AtomicU64::new(1),
                snapshots,
                read_marks: SyncMutex::new(Vec::new()),
            }),
        }
    }

    pub fn key(&self) -> ConversationKey {
        self.inner.key
    }

    pub fn me(&self) -> UserId {
        self.inner.me
    }

    pub fn partner(&self) -> UserId {
        self.inner.partner
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ConversationSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Observer for every change to the log or status.
    pub fn watch(&self) -> watch::Receiver<ConversationSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Subscribes to the conversation feed, loads the full history and marks incoming unread
    /// messages read (locally at once, remotely in the background).
    ///
    /// Returns the initial log. On failure the caller may retry.
    #[instrument(skip(self), fields(conversation = %self.inner.key))]
    pub async fn open(&self) -> Result<Vec<LogEntry>> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(ChatError::Closed);
        }
        if inner.lifecycle.lock().guard.is_some() {
            debug!("Conversation already open");
            return Ok(self.snapshot().entries);
        }

        info!(me = inner.me, partner = inner.partner, "step: conversation open started");
        inner.set_status(ConversationStatus::Loading).await;

        let filter = MessageFilter::Conversation(inner.key);
        let subscription =
            match with_timeout(inner.config.request_timeout, inner.feed.subscribe(filter)).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(error = %e, "Conversation feed subscription failed");
                    inner
                        .set_status(ConversationStatus::Stale(e.to_string()))
                        .await;
                    return Err(ChatError::Subscription(e.to_string()));
                }
            };
        let (mut events, guard) = subscription.into_parts();
        {
            let mut lifecycle = inner.lifecycle.lock();
            if lifecycle.closed {
                return Err(ChatError::Closed);
            }
            lifecycle.guard = Some(guard);
        }

        let rows = match with_timeout(inner.config.request_timeout, inner.store.query(&filter)).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Conversation history fetch failed");
                let guard = inner.lifecycle.lock().guard.take();
                if let Some(mut guard) = guard {
                    guard.unsubscribe();
                }
                inner
                    .set_status(ConversationStatus::Stale(e.to_string()))
                    .await;
                return Err(ChatError::Fetch(e.to_string()));
            }
        };

        let (entries, to_mark) = {
            let mut state = inner.state.lock().await;
            if inner.is_closed() {
                debug!("Discarding history that arrived after close");
                return Err(ChatError::Closed);
            }
            let reconciled = state.log.merge_history(rows);
            let unread = state.log.unread_incoming(inner.me);
            let to_mark = state.log.mark_read_local(&unread);
            state.status = ConversationStatus::Live;
            inner.publish(&state);
            info!(
                messages = state.log.len(),
                reconciled = reconciled.len(),
                marking_read = to_mark.len(),
                "step: conversation history loaded"
            );
            (state.log.entries(), to_mark)
        };
        inner.spawn_mark_read(to_mark);

        let pump_inner = Arc::clone(inner);
        let pump = tokio::spawn(async move {
            while let Some(item) = events.recv().await {
                match item {
                    Ok(event) => pump_inner.handle_event(event).await,
                    Err(interruption) => pump_inner.handle_interruption(interruption).await,
                }
            }
            debug!(conversation = %pump_inner.key, "Conversation feed stream ended");
        });
        {
            let mut lifecycle = inner.lifecycle.lock();
            if lifecycle.closed {
                pump.abort();
                return Err(ChatError::Closed);
            }
            lifecycle.pump = Some(pump);
        }

        Ok(entries)
    }

    /// Sends a message: the pending entry is visible before the insert is issued. On insert
    /// failure the entry is removed again and [`ChatError::Send`] names it.
    ///
    /// A blank `body` with an attachment is sent as the attachment's placeholder text.
    #[instrument(skip(self, body, attachment), fields(conversation = %self.inner.key))]
    pub async fn send(&self, body: &str, attachment: Option<Attachment>) -> Result<Message> {
        let inner = &self.inner;
        let text = body.trim();
        let body = match (&attachment, text.is_empty()) {
            (None, true) => return Err(ChatError::EmptyMessage),
            (Some(a), true) => a.kind.placeholder_body().to_string(),
            _ => text.to_string(),
        };

        let pending = {
            let mut state = inner.state.lock().await;
            if inner.is_closed() {
                return Err(ChatError::Closed);
            }
            let pending = PendingMessage {
                local_id: Uuid::new_v4(),
                seq: inner.next_seq.fetch_add(1, Ordering::Relaxed),
                sender_id: inner.me,
                receiver_id: inner.partner,
                body,
                attachment,
                created_at: Utc::now(),
                anchor: state.log.newest_committed_key(),
            };
            state.log.push_pending(pending.clone());
            inner.publish(&state);
            pending
        };
        let local_id = pending.local_id;
        debug!(%local_id, seq = pending.seq, "step: optimistic entry appended");

        let new_message = NewMessage {
            sender_id: pending.sender_id,
            receiver_id: pending.receiver_id,
            body: pending.body,
            attachment: pending.attachment,
        };

        match with_timeout(inner.config.request_timeout, inner.store.insert(&new_message)).await {
            Ok(committed) => {
                let mut state = inner.state.lock().await;
                if !inner.is_closed() {
                    let outcome = state.log.commit_pending(local_id, committed.clone());
                    inner.publish(&state);
                    debug!(%local_id, message_id = committed.id, ?outcome, "step: send committed");
                }
                Ok(committed)
            }
            Err(e) => {
                let mut state = inner.state.lock().await;
                state.log.remove_pending(local_id);
                if !inner.is_closed() {
                    inner.publish(&state);
                }
                warn!(%local_id, error = %e, "Send failed, optimistic entry rolled back");
                Err(ChatError::Send {
                    local_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Uploads `blob` and then sends it with `caption`. Nothing is sent if the upload fails.
    pub async fn send_attachment(
        &self,
        caption: &str,
        blob: &Blob,
        pipeline: &AttachmentPipeline,
    ) -> Result<Message> {
        let attachment = pipeline.upload(blob).await?;
        self.send(caption, Some(attachment)).await
    }

    /// Applies one feed event. Events for other conversations and events after close are ignored.
    pub async fn on_feed_event(&self, event: FeedEvent) {
        self.inner.handle_event(event).await;
    }

    /// Waits for background mark-read calls issued so far.
    pub async fn settle(&self) {
        let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.read_marks.lock());
        for handle in pending {
            let _ = handle.await;
        }
    }

    /// Re-fetches history and merges it into the log.
    pub async fn refresh(&self) -> Result<()> {
        self.inner.resync("refresh").await
    }

    /// Releases the feed subscription before returning. Idempotent; safe before or during `open`.
    /// Anything that arrives afterwards (history, feed events, insert results) is discarded.
    pub fn close(&self) {
        let (guard, pump) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.closed {
                return;
            }
            lifecycle.closed = true;
            (lifecycle.guard.take(), lifecycle.pump.take())
        };
        if let Some(mut guard) = guard {
            guard.unsubscribe();
        }
        if let Some(pump) = pump {
            pump.abort();
        }
        self.inner.snapshots.send_modify(|snapshot| {
            snapshot.status = ConversationStatus::Closed;
        });
        info!(conversation = %self.inner.key, "step: conversation closed");
    }
}

impl Drop for ConversationReconciler {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.lifecycle.lock().closed
    }

    fn publish(&self, state: &ReconcilerState) {
        self.snapshots.send_replace(ConversationSnapshot {
            key: self.key,
            entries: state.log.entries(),
            status: state.status.clone(),
        });
    }

    async fn set_status(&self, status: ConversationStatus) {
        let mut state = self.state.lock().await;
        if self.is_closed() {
            return;
        }
        state.status = status;
        self.publish(&state);
    }

    async fn handle_event(&self, event: FeedEvent) {
        if event.row().conversation_key() != self.key {
            debug!(
                conversation = %self.key,
                message_id = event.row().id,
                "Ignoring feed event for another conversation"
            );
            return;
        }

        let mut state = self.state.lock().await;
        if self.is_closed() {
            return;
        }

        match event {
            FeedEvent::Insert { row } => {
                let id = row.id;
                let incoming = row.receiver_id == self.me;
                let outcome = state.log.apply_insert(row);
                let to_mark = if incoming {
                    state.log.mark_read_local(&[id])
                } else {
                    Vec::new()
                };
                self.publish(&state);
                drop(state);
                debug!(conversation = %self.key, message_id = id, ?outcome, "step: feed insert applied");
                self.spawn_mark_read(to_mark);
            }
            FeedEvent::Update { row, .. } => match state.log.apply_update(&row) {
                UpdateOutcome::Applied => {
                    self.publish(&state);
                    debug!(conversation = %self.key, message_id = row.id, "step: feed update applied");
                }
                UpdateOutcome::Unchanged => {}
                UpdateOutcome::Unknown => {
                    drop(state);
                    warn!(
                        conversation = %self.key,
                        message_id = row.id,
                        "Update for unknown message, re-fetching"
                    );
                    let _ = self.resync("unknown update").await;
                }
            },
        }
    }

    async fn handle_interruption(&self, interruption: FeedInterruption) {
        warn!(conversation = %self.key, ?interruption, "Conversation feed interrupted, re-fetching");
        let _ = self.resync("feed interruption").await;
    }

    async fn resync(&self, reason: &str) -> Result<()> {
        if self.is_closed() {
            return Err(ChatError::Closed);
        }
        self.set_status(ConversationStatus::Resyncing).await;

        let filter = MessageFilter::Conversation(self.key);
        match with_timeout(self.config.request_timeout, self.store.query(&filter)).await {
            Ok(rows) => {
                let mut state = self.state.lock().await;
                if self.is_closed() {
                    return Err(ChatError::Closed);
                }
                let reconciled = state.log.merge_history(rows);
                let unread = state.log.unread_incoming(self.me);
                let to_mark = state.log.mark_read_local(&unread);
                state.status = ConversationStatus::Live;
                self.publish(&state);
                drop(state);
                info!(
                    conversation = %self.key,
                    reason,
                    reconciled = reconciled.len(),
                    "step: conversation re-fetched"
                );
                self.spawn_mark_read(to_mark);
                Ok(())
            }
            Err(e) => {
                warn!(conversation = %self.key, reason, error = %e, "Conversation re-fetch failed");
                self.set_status(ConversationStatus::Stale(e.to_string())).await;
                Err(ChatError::Fetch(e.to_string()))
            }
        }
    }

    /// Fire-and-continue mark-read; failures are logged and corrected by the next open or event.
    fn spawn_mark_read(&self, ids: Vec<MessageId>) {
        if ids.is_empty() {
            return;
        }
        let store = Arc::clone(&self.store);
        let limit = self.config.request_timeout;
        let key = self.key;
        let handle = tokio::spawn(async move {
            match with_timeout(limit, store.update_read_state(&ids)).await {
                Ok(()) => debug!(conversation = %key, count = ids.len(), "Marked messages read"),
                Err(e) => {
                    let error = ChatError::ReadMark(e.to_string());
                    warn!(conversation = %key, ids = ?ids, error = %error, "Mark-read failed");
                }
            }
        });
        let mut read_marks = self.read_marks.lock();
        read_marks.retain(|h| !h.is_finished());
        read_marks.push(handle);
    }
}
