use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a backend boundary (message store, change feed, blob store, profiles).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Errors surfaced by the sync engine to the screens that drive it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Initial load (conversation history, inbox, unread count) failed; the view shows a retry state.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The optimistic entry `local_id` was rolled back.
    #[error("Send error for {local_id}: {reason}")]
    Send { local_id: Uuid, reason: String },

    /// Upload failed; no message row was created.
    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Attachment too large: {size} bytes (max {max})")]
    AttachmentTooLarge { size: u64, max: u64 },

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Read mark error: {0}")]
    ReadMark(String),

    #[error("Message has neither text nor attachment")]
    EmptyMessage,

    #[error("Conversation is closed")]
    Closed,

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
