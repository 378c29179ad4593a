//! Component factory: builds the backend and engine pieces from config.

use std::sync::Arc;

use anyhow::Result;
use change_feed::FeedBroker;
use chat_core::{ChangeFeed, MessageStore, UserId};
use chat_sync::{
    AttachmentPipeline, ConversationReconciler, InboxProjector, SyncConfig, UnreadAggregator,
};
use storage::{LocalBlobStore, MessageRepository, ProfileRepository, SqlitePoolManager};
use tracing::{error, info, instrument};

use crate::config::CliConfig;

/// Shared backend handles; every engine component is built from these.
pub struct ChatComponents {
    pub broker: FeedBroker,
    pub repo: Arc<MessageRepository>,
    pub profiles: Arc<ProfileRepository>,
    pub blobs: Arc<LocalBlobStore>,
    pub sync: SyncConfig,
}

impl ChatComponents {
    /// Opens the database (one pool for messages and profiles) and wires the repository to a
    /// fresh feed broker.
    #[instrument(skip(config), fields(database_url = %config.database_url))]
    pub async fn build(config: &CliConfig) -> Result<Self> {
        let pool = SqlitePoolManager::new(&config.database_url).await.map_err(|e| {
            error!(error = %e, "Failed to open database");
            anyhow::anyhow!("Failed to open database {}: {}", config.database_url, e)
        })?;

        let broker = FeedBroker::with_capacity(config.sync.feed_buffer);
        let repo = MessageRepository::from_pool(pool.clone())
            .await?
            .with_feed(broker.clone());
        let profiles = ProfileRepository::from_pool(pool).await?;
        let blobs = LocalBlobStore::new(&config.blob_dir);

        info!(blob_dir = %config.blob_dir, "step: components ready");
        Ok(Self {
            broker,
            repo: Arc::new(repo),
            profiles: Arc::new(profiles),
            blobs: Arc::new(blobs),
            sync: config.sync.clone(),
        })
    }

    fn store(&self) -> Arc<dyn MessageStore> {
        self.repo.clone()
    }

    fn feed(&self) -> Arc<dyn ChangeFeed> {
        Arc::new(self.broker.clone())
    }

    pub fn reconciler(&self, me: UserId, partner: UserId) -> ConversationReconciler {
        ConversationReconciler::new(me, partner, self.store(), self.feed(), self.sync.clone())
    }

    pub fn aggregator(&self) -> UnreadAggregator {
        UnreadAggregator::new(self.store(), self.feed(), self.sync.clone())
    }

    pub fn inbox(&self) -> InboxProjector {
        InboxProjector::new(self.store(), self.profiles.clone(), self.sync.clone())
    }

    pub fn attachments(&self) -> AttachmentPipeline {
        AttachmentPipeline::new(self.blobs.clone(), &self.sync)
    }
}
