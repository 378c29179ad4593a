//! Directory-backed blob store: writes each payload under a unique name and returns a `file://` URL.

use std::path::PathBuf;

use async_trait::async_trait;
use chat_core::{BackendError, Blob, BlobStore, StoredBlob};
use tracing::info;
use uuid::Uuid;

use crate::error::StorageError;

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Keeps ASCII alphanumerics, dots, dashes and underscores of the original name.
    fn sanitize(file_name: &str) -> String {
        let cleaned: String = file_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let cleaned = cleaned.trim_start_matches('.').to_string();
        if cleaned.is_empty() {
            "blob".to_string()
        } else {
            cleaned
        }
    }

    async fn write(&self, blob: &Blob) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let root = tokio::fs::canonicalize(&self.root).await?;
        let path = root.join(format!("{}-{}", Uuid::new_v4(), Self::sanitize(&blob.file_name)));
        tokio::fs::write(&path, &blob.bytes).await?;
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, blob: &Blob, max_size_bytes: u64) -> Result<StoredBlob, BackendError> {
        if blob.len() > max_size_bytes {
            return Err(BackendError::Rejected(format!(
                "payload of {} bytes exceeds limit of {} bytes",
                blob.len(),
                max_size_bytes
            )));
        }

        let path = self.write(blob).await?;
        info!(
            path = %path.display(),
            size = blob.len(),
            content_type = %blob.content_type,
            "Stored blob"
        );
        Ok(StoredBlob {
            url: format!("file://{}", path.display()),
            content_type: blob.content_type.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_names() {
        assert_eq!(LocalBlobStore::sanitize("photo 1.png"), "photo_1.png");
        assert_eq!(LocalBlobStore::sanitize("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(LocalBlobStore::sanitize(""), "blob");
        assert_eq!(LocalBlobStore::sanitize("..."), "blob");
    }

    #[tokio::test]
    async fn test_upload_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs"));
        let blob = Blob::new(b"hello".to_vec(), "text/plain", "note.txt");

        let stored = store.upload(&blob, 1024).await.unwrap();

        assert!(stored.url.starts_with("file://"));
        assert!(stored.url.ends_with("-note.txt"));
        assert_eq!(stored.content_type, "text/plain");
        let path = stored.url.trim_start_matches("file://");
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_upload_rejects_oversized_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        let store = LocalBlobStore::new(&root);
        let blob = Blob::new(vec![0u8; 10], "image/png", "big.png");

        let result = store.upload(&blob, 9).await;

        assert!(matches!(result, Err(BackendError::Rejected(_))));
        assert!(!root.exists());
    }
}
