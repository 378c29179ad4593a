//! Storage error types.
//!
//! Used by the repositories internally; converted to [`chat_core::BackendError`] at the trait boundary.

use chat_core::BackendError;
use thiserror::Error;

/// Errors that can occur when using storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StorageError::NotFound("row".to_string()),
            other => StorageError::Database(other.to_string()),
        }
    }
}

impl From<StorageError> for BackendError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Database(msg) => BackendError::Database(msg),
            StorageError::NotFound(msg) => BackendError::NotFound(msg),
            StorageError::CorruptRow(msg) => BackendError::Database(format!("corrupt row: {}", msg)),
            StorageError::Io(e) => BackendError::Transport(e.to_string()),
        }
    }
}
