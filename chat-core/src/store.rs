//! Backend boundaries consumed by the sync engine.
//!
//! Implementations map to a concrete backend (SQLite in the `storage` crate, the in-process
//! broker in `change-feed`); the engine only sees these traits.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::feed::Subscription;
use crate::types::{Blob, Message, MessageFilter, MessageId, NewMessage, Profile, StoredBlob, UserId};

/// Remote relational message table.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Inserts a row and returns it as committed (server id and timestamp assigned).
    async fn insert(&self, message: &NewMessage) -> Result<Message, BackendError>;

    /// Rows matching `filter`, ordered by `created_at` ascending.
    async fn query(&self, filter: &MessageFilter) -> Result<Vec<Message>, BackendError>;

    /// Marks rows read. Re-marking an already-read row is a no-op, not an error.
    async fn update_read_state(&self, ids: &[MessageId]) -> Result<(), BackendError>;

    /// Number of rows where `receiver_id = identity AND is_read = false`.
    async fn count_unread(&self, identity: UserId) -> Result<u64, BackendError>;
}

/// Row-change notification stream.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a subscription delivering insert/update events for rows matching `filter`, in order,
    /// until it is unsubscribed.
    async fn subscribe(&self, filter: MessageFilter) -> Result<Subscription, BackendError>;
}

/// Object storage for attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, blob: &Blob, max_size_bytes: u64) -> Result<StoredBlob, BackendError>;
}

/// Public profile lookup. Unknown ids resolve to [`Profile::placeholder`].
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn resolve_identities(&self, ids: &[UserId]) -> Result<Vec<Profile>, BackendError>;
}
