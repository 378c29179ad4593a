//! Change feed events and subscription handles.
//!
//! Backend payloads are parsed into the closed [`FeedEvent`] type at the boundary; anything that
//! does not parse is rejected there and never reaches the reconciler or the aggregator.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{Message, MessageFilter};

/// A row change delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedEvent {
    Insert {
        row: Message,
    },
    Update {
        row: Message,
        /// Read state before the update, when the backend reports it.
        #[serde(default, rename = "previousIsRead")]
        previous_is_read: Option<bool>,
    },
}

impl FeedEvent {
    pub fn row(&self) -> &Message {
        match self {
            FeedEvent::Insert { row } => row,
            FeedEvent::Update { row, .. } => row,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FeedEvent::Insert { .. } => "insert",
            FeedEvent::Update { .. } => "update",
        }
    }

    /// Parses a raw backend payload such as
    /// `{"type":"insert","row":{"id":501,"senderId":1,...}}`.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, FeedParseError> {
        let kind = payload
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(FeedParseError::MissingType)?;
        if kind != "insert" && kind != "update" {
            return Err(FeedParseError::UnknownType(kind.to_string()));
        }
        serde_json::from_value(payload.clone()).map_err(|e| FeedParseError::InvalidRow(e.to_string()))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedParseError {
    #[error("Payload has no event type")]
    MissingType,

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// The subscription may have missed events; consumers re-derive state from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedInterruption {
    /// `n` events were dropped because the subscriber fell behind.
    Lagged(u64),
    /// The underlying connection was re-established.
    Reconnected,
}

pub type FeedItem = Result<FeedEvent, FeedInterruption>;

/// Releases a feed subscription. Idempotent; also runs on drop.
pub struct SubscriptionGuard {
    id: u64,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionGuard {
    pub fn new(id: u64, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Returns true if this call released the subscription.
    pub fn unsubscribe(&mut self) -> bool {
        match self.release.take() {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Live subscription: an ordered stream of [`FeedItem`]s plus its release handle.
#[derive(Debug)]
pub struct Subscription {
    filter: MessageFilter,
    receiver: mpsc::Receiver<FeedItem>,
    guard: SubscriptionGuard,
}

impl Subscription {
    pub fn new(filter: MessageFilter, receiver: mpsc::Receiver<FeedItem>, guard: SubscriptionGuard) -> Self {
        Self {
            filter,
            receiver,
            guard,
        }
    }

    pub fn id(&self) -> u64 {
        self.guard.id()
    }

    pub fn filter(&self) -> MessageFilter {
        self.filter
    }

    /// Next item in delivery order; `None` once unsubscribed and drained.
    pub async fn next(&mut self) -> Option<FeedItem> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(&mut self) {
        self.guard.unsubscribe();
        self.receiver.close();
    }

    /// Splits into the event stream and the release handle so they can be owned separately.
    pub fn into_parts(self) -> (mpsc::Receiver<FeedItem>, SubscriptionGuard) {
        (self.receiver, self.guard)
    }
}
