//! # chat-core
//!
//! Core types and traits for the conversation sync engine: [`Message`], [`ConversationKey`],
//! [`FeedEvent`], the backend boundaries ([`MessageStore`], [`ChangeFeed`], [`BlobStore`],
//! [`ProfileDirectory`]), the error taxonomy and tracing initialization. Backend-agnostic;
//! used by storage, change-feed and chat-sync.

pub mod error;
pub mod feed;
pub mod logger;
pub mod store;
pub mod types;

pub use error::{BackendError, ChatError, Result};
pub use feed::{FeedEvent, FeedInterruption, FeedItem, FeedParseError, Subscription, SubscriptionGuard};
pub use logger::init_tracing;
pub use store::{BlobStore, ChangeFeed, MessageStore, ProfileDirectory};
pub use types::{
    Attachment, AttachmentKind, Blob, ConversationKey, Message, MessageFilter, MessageId,
    NewMessage, Profile, StoredBlob, UserId,
};
