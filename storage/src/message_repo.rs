//! Message repository: persistence and queries for messages.
//!
//! Implements [`MessageStore`] over SQLite. When a [`FeedBroker`] is attached, every committed
//! insert and every real read-state flip is published to it, acting as the backend's change stream.

use async_trait::async_trait;
use chat_core::{
    BackendError, FeedEvent, Message, MessageFilter, MessageId, MessageStore, NewMessage, UserId,
};
use change_feed::FeedBroker;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::models::MessageRecord;
use crate::sqlite_pool::SqlitePoolManager;

#[derive(Clone)]
pub struct MessageRepository {
    pool_manager: SqlitePoolManager,
    feed: Option<FeedBroker>,
}

impl MessageRepository {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool_manager = SqlitePoolManager::new(database_url).await?;
        Self::from_pool(pool_manager).await
    }

    /// Uses an existing pool (shared with [`crate::ProfileRepository`]).
    pub async fn from_pool(pool_manager: SqlitePoolManager) -> Result<Self, StorageError> {
        let repo = Self {
            pool_manager,
            feed: None,
        };
        repo.init().await?;
        Ok(repo)
    }

    /// Publishes committed changes to `feed`.
    pub fn with_feed(mut self, feed: FeedBroker) -> Self {
        self.feed = Some(feed);
        self
    }

    async fn init(&self) -> Result<(), StorageError> {
        info!("Creating messages table if not exist");

        let pool = self.pool_manager.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER NOT NULL,
                receiver_id INTEGER NOT NULL,
                body TEXT NOT NULL,
                attachment_url TEXT,
                attachment_kind TEXT,
                attachment_name TEXT,
                created_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_sender_id ON messages(sender_id);
            CREATE INDEX IF NOT EXISTS idx_messages_receiver_unread ON messages(receiver_id, is_read);
            CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
            "#,
        )
        .execute(pool)
        .await?;

        info!("Messages table ready");
        Ok(())
    }

    fn publish(&self, event: FeedEvent) {
        if let Some(feed) = &self.feed {
            feed.publish(event);
        }
    }

    pub async fn save(&self, message: &NewMessage) -> Result<Message, StorageError> {
        let pool = self.pool_manager.pool();
        let (url, kind, name) = match &message.attachment {
            Some(a) => (
                Some(a.url.as_str()),
                Some(a.kind.as_str()),
                Some(a.display_name.as_str()),
            ),
            None => (None, None, None),
        };

        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (sender_id, receiver_id, body, attachment_url, attachment_kind, attachment_name, created_at, is_read)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            RETURNING *
            "#,
        )
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.body)
        .bind(url)
        .bind(kind)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        let committed = record.into_message()?;
        info!(
            message_id = committed.id,
            sender_id = committed.sender_id,
            receiver_id = committed.receiver_id,
            "Saved message"
        );
        self.publish(FeedEvent::Insert {
            row: committed.clone(),
        });
        Ok(committed)
    }

    pub async fn get_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, StorageError> {
        let pool = self.pool_manager.pool();

        let records: Vec<MessageRecord> = match *filter {
            MessageFilter::Conversation(key) => {
                let (a, b) = key.participants();
                sqlx::query_as(
                    "SELECT * FROM messages \
                     WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?) \
                     ORDER BY created_at ASC, id ASC",
                )
                .bind(a)
                .bind(b)
                .bind(b)
                .bind(a)
                .fetch_all(pool)
                .await?
            }
            MessageFilter::Involving(id) => {
                sqlx::query_as(
                    "SELECT * FROM messages WHERE sender_id = ? OR receiver_id = ? \
                     ORDER BY created_at ASC, id ASC",
                )
                .bind(id)
                .bind(id)
                .fetch_all(pool)
                .await?
            }
            MessageFilter::ReceivedBy(id) => {
                sqlx::query_as(
                    "SELECT * FROM messages WHERE receiver_id = ? ORDER BY created_at ASC, id ASC",
                )
                .bind(id)
                .fetch_all(pool)
                .await?
            }
        };

        let messages = records
            .into_iter()
            .map(MessageRecord::into_message)
            .collect::<Result<Vec<_>, _>>()?;
        info!(filter = %filter, count = messages.len(), "Retrieved messages");
        Ok(messages)
    }

    /// Flips unread rows to read and returns the rows that actually changed.
    pub async fn mark_read(&self, ids: &[MessageId]) -> Result<Vec<Message>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.pool_manager.pool();

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE messages SET is_read = 1 WHERE is_read = 0 AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") RETURNING *");

        let records: Vec<MessageRecord> = builder.build_query_as().fetch_all(pool).await?;
        let changed = records
            .into_iter()
            .map(MessageRecord::into_message)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(requested = ids.len(), changed = changed.len(), "Marked messages read");
        for row in &changed {
            self.publish(FeedEvent::Update {
                row: row.clone(),
                previous_is_read: Some(false),
            });
        }
        Ok(changed)
    }

    pub async fn count_unread_for(&self, identity: UserId) -> Result<u64, StorageError> {
        let pool = self.pool_manager.pool();

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = 0")
                .bind(identity)
                .fetch_one(pool)
                .await?;

        Ok(count.0.max(0) as u64)
    }

    pub async fn get_message_by_id(&self, message_id: MessageId) -> Result<Option<Message>, StorageError> {
        let pool = self.pool_manager.pool();

        let record = sqlx::query_as::<_, MessageRecord>("SELECT * FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_optional(pool)
            .await?;

        record.map(MessageRecord::into_message).transpose()
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn insert(&self, message: &NewMessage) -> Result<Message, BackendError> {
        Ok(self.save(message).await?)
    }

    async fn query(&self, filter: &MessageFilter) -> Result<Vec<Message>, BackendError> {
        Ok(self.get_messages(filter).await?)
    }

    async fn update_read_state(&self, ids: &[MessageId]) -> Result<(), BackendError> {
        self.mark_read(ids).await?;
        Ok(())
    }

    async fn count_unread(&self, identity: UserId) -> Result<u64, BackendError> {
        Ok(self.count_unread_for(identity).await?)
    }
}
