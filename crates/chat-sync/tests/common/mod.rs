//! Shared fixtures for chat-sync integration tests: an in-memory SQLite backend wired to a feed
//! broker, plus store/feed/blob doubles that fail or block on demand.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_core::{
    BackendError, Blob, BlobStore, ChangeFeed, Message, MessageFilter, MessageId, MessageStore,
    NewMessage, Profile, ProfileDirectory, StoredBlob, Subscription, UserId,
};
use change_feed::FeedBroker;
use chat_sync::SyncConfig;
use storage::{MessageRepository, ProfileRepository, SqlitePoolManager};
use tokio::sync::Semaphore;

/// One in-memory database shared by all repositories.
pub struct Backend {
    pub broker: FeedBroker,
    /// Publishes every committed change to `broker`.
    pub repo: MessageRepository,
    /// Same table, but writes are invisible to the feed (simulates missed events).
    pub quiet: MessageRepository,
    pub profiles: ProfileRepository,
}

impl Backend {
    pub fn store(&self) -> Arc<dyn MessageStore> {
        Arc::new(self.repo.clone())
    }

    pub fn feed(&self) -> Arc<dyn ChangeFeed> {
        Arc::new(self.broker.clone())
    }

    pub async fn send(&self, sender_id: UserId, receiver_id: UserId, body: &str) -> Message {
        self.repo
            .save(&text(sender_id, receiver_id, body))
            .await
            .expect("Failed to save message")
    }
}

pub async fn backend() -> Backend {
    backend_with_broker(FeedBroker::new()).await
}

/// Backend whose broker buffers at most `capacity` items per subscription.
pub async fn backend_with_capacity(capacity: usize) -> Backend {
    backend_with_broker(FeedBroker::with_capacity(capacity)).await
}

async fn backend_with_broker(broker: FeedBroker) -> Backend {
    let pool = SqlitePoolManager::new("sqlite::memory:")
        .await
        .expect("Failed to create pool");
    let quiet = MessageRepository::from_pool(pool.clone())
        .await
        .expect("Failed to create message repository");
    let profiles = ProfileRepository::from_pool(pool)
        .await
        .expect("Failed to create profile repository");
    let repo = quiet.clone().with_feed(broker.clone());

    Backend {
        broker,
        repo,
        quiet,
        profiles,
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        request_timeout: Duration::from_secs(2),
        ..SyncConfig::default()
    }
}

pub fn text(sender_id: UserId, receiver_id: UserId, body: &str) -> NewMessage {
    NewMessage {
        sender_id,
        receiver_id,
        body: body.to_string(),
        attachment: None,
    }
}

/// Polls `check` until it holds; panics after 5 seconds.
pub async fn wait_for<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached within 5s");
}

/// Async variant of [`wait_for`] for checks that query the store.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached within 5s");
}

/// Delegating store whose operations can be switched to fail.
pub struct FailingStore {
    inner: Arc<dyn MessageStore>,
    pub fail_insert: AtomicBool,
    pub fail_query: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_count: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn MessageStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_insert: AtomicBool::new(false),
            fail_query: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_count: AtomicBool::new(false),
        })
    }

    fn check(flag: &AtomicBool) -> Result<(), BackendError> {
        if flag.load(Ordering::SeqCst) {
            Err(BackendError::Transport("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageStore for FailingStore {
    async fn insert(&self, message: &NewMessage) -> Result<Message, BackendError> {
        Self::check(&self.fail_insert)?;
        self.inner.insert(message).await
    }

    async fn query(&self, filter: &MessageFilter) -> Result<Vec<Message>, BackendError> {
        Self::check(&self.fail_query)?;
        self.inner.query(filter).await
    }

    async fn update_read_state(&self, ids: &[MessageId]) -> Result<(), BackendError> {
        Self::check(&self.fail_update)?;
        self.inner.update_read_state(ids).await
    }

    async fn count_unread(&self, identity: UserId) -> Result<u64, BackendError> {
        Self::check(&self.fail_count)?;
        self.inner.count_unread(identity).await
    }
}

/// Store whose unread count first commits one more unread message for the counted identity
/// (published to the feed) while `races` is positive, so the event lands during the count.
pub struct RacingStore {
    repo: MessageRepository,
    pub races: AtomicUsize,
}

impl RacingStore {
    pub fn new(repo: MessageRepository) -> Arc<Self> {
        Arc::new(Self {
            repo,
            races: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MessageStore for RacingStore {
    async fn insert(&self, message: &NewMessage) -> Result<Message, BackendError> {
        self.repo.insert(message).await
    }

    async fn query(&self, filter: &MessageFilter) -> Result<Vec<Message>, BackendError> {
        self.repo.query(filter).await
    }

    async fn update_read_state(&self, ids: &[MessageId]) -> Result<(), BackendError> {
        self.repo.update_read_state(ids).await
    }

    async fn count_unread(&self, identity: UserId) -> Result<u64, BackendError> {
        let racing = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if racing {
            self.repo.save(&text(2, identity, "raced")).await?;
        }
        self.repo.count_unread(identity).await
    }
}

/// Delegating store whose inserts and queries block until [`GatedStore::release`] is called.
pub struct GatedStore {
    inner: Arc<dyn MessageStore>,
    gate_inserts: bool,
    gate_queries: bool,
    permits: Semaphore,
}

impl GatedStore {
    pub fn inserts(inner: Arc<dyn MessageStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate_inserts: true,
            gate_queries: false,
            permits: Semaphore::new(0),
        })
    }

    pub fn queries(inner: Arc<dyn MessageStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate_inserts: false,
            gate_queries: true,
            permits: Semaphore::new(0),
        })
    }

    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    async fn pass(&self) {
        self.permits
            .acquire()
            .await
            .expect("gate semaphore closed")
            .forget();
    }
}

#[async_trait]
impl MessageStore for GatedStore {
    async fn insert(&self, message: &NewMessage) -> Result<Message, BackendError> {
        if self.gate_inserts {
            self.pass().await;
        }
        self.inner.insert(message).await
    }

    async fn query(&self, filter: &MessageFilter) -> Result<Vec<Message>, BackendError> {
        if self.gate_queries {
            self.pass().await;
        }
        self.inner.query(filter).await
    }

    async fn update_read_state(&self, ids: &[MessageId]) -> Result<(), BackendError> {
        self.inner.update_read_state(ids).await
    }

    async fn count_unread(&self, identity: UserId) -> Result<u64, BackendError> {
        self.inner.count_unread(identity).await
    }
}

/// Feed that refuses every subscription.
pub struct DeadFeed;

#[async_trait]
impl ChangeFeed for DeadFeed {
    async fn subscribe(&self, _filter: MessageFilter) -> Result<Subscription, BackendError> {
        Err(BackendError::Transport("feed unavailable".to_string()))
    }
}

/// Profile directory that is always down.
pub struct DeadProfiles;

#[async_trait]
impl ProfileDirectory for DeadProfiles {
    async fn resolve_identities(&self, _ids: &[UserId]) -> Result<Vec<Profile>, BackendError> {
        Err(BackendError::Transport("profiles unavailable".to_string()))
    }
}

/// Blob store that counts uploads and can fail or stall.
#[derive(Default)]
pub struct RecordingBlobStore {
    pub uploads: AtomicUsize,
    pub fail: AtomicBool,
    pub stall: AtomicBool,
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn upload(&self, blob: &Blob, max_size_bytes: u64) -> Result<StoredBlob, BackendError> {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("bucket unreachable".to_string()));
        }
        if blob.len() > max_size_bytes {
            return Err(BackendError::Rejected("too large".to_string()));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StoredBlob {
            url: format!("https://blobs.test/{}/{}", n, blob.file_name),
            content_type: blob.content_type.clone(),
        })
    }
}
