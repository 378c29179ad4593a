//! Pairing of an optimistic send with the committed row the backend echoes back.

use std::time::Duration;

use chat_core::{Attachment, Message, MessageId, UserId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A locally-created message that the backend has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub local_id: Uuid,
    /// Monotonic per reconciler; orders simultaneous pending sends.
    pub seq: u64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    pub attachment: Option<Attachment>,
    /// Local clock at send time.
    pub created_at: DateTime<Utc>,
    /// Order key of the newest committed message in the log when this was sent.
    pub anchor: Option<(DateTime<Utc>, MessageId)>,
}

/// True when `committed` is the backend's copy of `pending`.
///
/// Requires the same sender and receiver, the same content (attachment URL when both carry an
/// attachment, otherwise the body), a committed row newer than anything the sender had seen when
/// sending, and timestamps no further apart than `window`.
pub fn matches(pending: &PendingMessage, committed: &Message, window: Duration) -> bool {
    if pending.sender_id != committed.sender_id || pending.receiver_id != committed.receiver_id {
        return false;
    }

    let same_content = match (&pending.attachment, &committed.attachment) {
        (Some(p), Some(c)) => p.url == c.url,
        (None, None) => pending.body == committed.body,
        _ => false,
    };
    if !same_content {
        return false;
    }

    if let Some(anchor) = pending.anchor {
        if committed.order_key() <= anchor {
            return false;
        }
    }

    let skew_ms = (committed.created_at - pending.created_at)
        .num_milliseconds()
        .unsigned_abs();
    u128::from(skew_ms) <= window.as_millis()
}
