//! Attachment pipeline: validates and uploads a payload, producing the [`Attachment`] a message
//! row references.

use std::sync::Arc;

use chat_core::{Attachment, AttachmentKind, Blob, BlobStore, ChatError, Result};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::timeout::with_timeout;

pub struct AttachmentPipeline {
    blob_store: Arc<dyn BlobStore>,
    max_size_bytes: u64,
    request_timeout: std::time::Duration,
}

impl AttachmentPipeline {
    pub fn new(blob_store: Arc<dyn BlobStore>, config: &SyncConfig) -> Self {
        Self {
            blob_store,
            max_size_bytes: config.max_attachment_bytes,
            request_timeout: config.request_timeout,
        }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Uploads `blob`. Oversized payloads are rejected before anything is sent to the store.
    pub async fn upload(&self, blob: &Blob) -> Result<Attachment> {
        if blob.is_empty() {
            return Err(ChatError::Upload(format!("{} is empty", blob.file_name)));
        }
        let size = blob.len();
        if size > self.max_size_bytes {
            warn!(
                file_name = %blob.file_name,
                size,
                max = self.max_size_bytes,
                "Attachment rejected before upload"
            );
            return Err(ChatError::AttachmentTooLarge {
                size,
                max: self.max_size_bytes,
            });
        }

        let stored = with_timeout(
            self.request_timeout,
            self.blob_store.upload(blob, self.max_size_bytes),
        )
        .await
        .map_err(|e| {
            warn!(file_name = %blob.file_name, error = %e, "Attachment upload failed");
            ChatError::Upload(e.to_string())
        })?;

        let content_type = if stored.content_type.is_empty() {
            blob.content_type.as_str()
        } else {
            stored.content_type.as_str()
        };
        let kind = AttachmentKind::from_content_type(content_type);
        info!(url = %stored.url, kind = kind.as_str(), size, "step: attachment uploaded");

        Ok(Attachment {
            url: stored.url,
            kind,
            display_name: blob.file_name.clone(),
        })
    }
}
