//! Message record model for persistence.
//!
//! Maps to the `messages` table and is used by MessageRepository.

use chat_core::{Attachment, AttachmentKind, Message};
use chrono::{DateTime, Utc};

use crate::error::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRecord {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub body: String,
    pub attachment_url: Option<String>,
    pub attachment_kind: Option<String>,
    pub attachment_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl MessageRecord {
    /// Converts the row into a committed [`Message`]. An attachment needs both url and kind.
    pub fn into_message(self) -> Result<Message, StorageError> {
        let attachment = match (self.attachment_url, self.attachment_kind) {
            (Some(url), Some(kind)) => {
                let kind = AttachmentKind::parse(&kind).ok_or_else(|| {
                    StorageError::CorruptRow(format!(
                        "message {} has unknown attachment kind '{}'",
                        self.id, kind
                    ))
                })?;
                Some(Attachment {
                    display_name: self.attachment_name.unwrap_or_else(|| url.clone()),
                    url,
                    kind,
                })
            }
            (None, None) => None,
            _ => {
                return Err(StorageError::CorruptRow(format!(
                    "message {} has a partial attachment",
                    self.id
                )))
            }
        };

        Ok(Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            body: self.body,
            attachment,
            created_at: self.created_at,
            is_read: self.is_read,
        })
    }
}
