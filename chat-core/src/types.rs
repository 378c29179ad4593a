//! Core types: identities, conversation key, committed message, attachment, profile and filters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Participant identity.
pub type UserId = i64;

/// Server-assigned message identity.
pub type MessageId = i64;

/// Unordered pair of participants that groups messages into one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn participants(&self) -> (UserId, UserId) {
        (self.low, self.high)
    }

    pub fn involves(&self, identity: UserId) -> bool {
        self.low == identity || self.high == identity
    }

    /// The participant that is not `me`, or `None` when `me` is not part of the conversation.
    pub fn other(&self, me: UserId) -> Option<UserId> {
        if self.low == me {
            Some(self.high)
        } else if self.high == me {
            Some(self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
}

impl AttachmentKind {
    /// Classifies a declared media type (`image/png`, `video/mp4`, ...). Anything that is not an
    /// image or a video is a document.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence.starts_with("image/") {
            AttachmentKind::Image
        } else if essence.starts_with("video/") {
            AttachmentKind::Video
        } else {
            AttachmentKind::Document
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Video => "video",
            AttachmentKind::Document => "document",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(AttachmentKind::Image),
            "video" => Some(AttachmentKind::Video),
            "document" => Some(AttachmentKind::Document),
            _ => None,
        }
    }

    /// Outgoing text used when an attachment is sent without a caption.
    pub fn placeholder_body(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "Sent an image",
            AttachmentKind::Video => "Sent a video",
            AttachmentKind::Document => "Sent a file",
        }
    }
}

/// Durable reference to an uploaded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub kind: AttachmentKind,
    pub display_name: String,
}

/// A committed message row. Pending (not yet committed) entries live in the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Message {
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(self.sender_id, self.receiver_id)
    }

    pub fn is_unread_for(&self, identity: UserId) -> bool {
        self.receiver_id == identity && !self.is_read
    }

    /// Ordering key for committed messages: server timestamp, then id.
    pub fn order_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }
}

/// Row handed to [`crate::MessageStore::insert`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    pub attachment: Option<Attachment>,
}

/// Predicate shared by store queries and feed subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "value", rename_all = "camelCase")]
pub enum MessageFilter {
    /// Messages between the two participants.
    Conversation(ConversationKey),
    /// Messages sent or received by the identity (the inbox).
    Involving(UserId),
    /// Messages received by the identity (the unread badge).
    ReceivedBy(UserId),
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            MessageFilter::Conversation(key) => message.conversation_key() == *key,
            MessageFilter::Involving(id) => message.sender_id == *id || message.receiver_id == *id,
            MessageFilter::ReceivedBy(id) => message.receiver_id == *id,
        }
    }
}

impl fmt::Display for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageFilter::Conversation(key) => write!(f, "conversation={}", key),
            MessageFilter::Involving(id) => write!(f, "involving={}", id),
            MessageFilter::ReceivedBy(id) => write!(f, "received_by={}", id),
        }
    }
}

/// Public profile data used for inbox rows and conversation headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// True when the directory had no data for this id.
    #[serde(default)]
    pub is_placeholder: bool,
}

impl Profile {
    pub fn placeholder(id: UserId) -> Self {
        Self {
            id,
            display_name: format!("User {}", id),
            avatar_url: None,
            is_placeholder: true,
        }
    }
}

/// Local binary payload waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

impl Blob {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What the blob store returns for an uploaded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    pub url: String,
    pub content_type: String,
}
