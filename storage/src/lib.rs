//! Storage crate: SQLite-backed backend boundaries for the sync engine.
//!
//! ## Modules
//!
//! - [`error`] – Storage error types
//! - [`models`] – MessageRecord, ProfileRecord (row mappings)
//! - [`message_repo`] – MessageRepository (SQLite [`chat_core::MessageStore`], publishes to the change feed)
//! - [`profile_repo`] – ProfileRepository (SQLite [`chat_core::ProfileDirectory`])
//! - [`blob_store`] – LocalBlobStore (directory-backed [`chat_core::BlobStore`])
//! - [`sqlite_pool`] – SqlitePoolManager

mod blob_store;
mod error;
mod message_repo;
mod models;
mod profile_repo;
mod sqlite_pool;


pub use blob_store::LocalBlobStore;
pub use error::StorageError;
pub use message_repo::MessageRepository;
pub use models::{MessageRecord, ProfileRecord};
pub use profile_repo::ProfileRepository;
pub use sqlite_pool::SqlitePoolManager;
