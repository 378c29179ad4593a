//! Profile repository: public profile rows used for inbox rows and conversation headers.

use std::collections::HashMap;

use async_trait::async_trait;
use chat_core::{BackendError, Profile, ProfileDirectory, UserId};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::models::ProfileRecord;
use crate::sqlite_pool::SqlitePoolManager;

#[derive(Clone)]
pub struct ProfileRepository {
    pool_manager: SqlitePoolManager,
}

impl ProfileRepository {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool_manager = SqlitePoolManager::new(database_url).await?;
        Self::from_pool(pool_manager).await
    }

    pub async fn from_pool(pool_manager: SqlitePoolManager) -> Result<Self, StorageError> {
        let repo = Self { pool_manager };
        repo.init().await?;
        Ok(repo)
    }

    async fn init(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL,
                avatar_url TEXT
            )
            "#,
        )
        .execute(self.pool_manager.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert(&self, id: UserId, display_name: &str, avatar_url: Option<&str>) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, display_name, avatar_url) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, avatar_url = excluded.avatar_url
            "#,
        )
        .bind(id)
        .bind(display_name)
        .bind(avatar_url)
        .execute(self.pool_manager.pool())
        .await?;

        info!(user_id = id, display_name = %display_name, "Saved profile");
        Ok(())
    }

    pub async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, StorageError> {
        let record = sqlx::query_as::<_, ProfileRecord>("SELECT * FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool_manager.pool())
            .await?;
        Ok(record.map(Profile::from))
    }

    /// One profile per requested id, in request order; unknown ids become placeholders.
    pub async fn resolve(&self, ids: &[UserId]) -> Result<Vec<Profile>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM profiles WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let records: Vec<ProfileRecord> = builder
            .build_query_as()
            .fetch_all(self.pool_manager.pool())
            .await?;
        let known: HashMap<UserId, Profile> = records
            .into_iter()
            .map(|r| (r.id, Profile::from(r)))
            .collect();

        let profiles: Vec<Profile> = ids
            .iter()
            .map(|id| {
                known
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| Profile::placeholder(*id))
            })
            .collect();

        debug!(
            requested = ids.len(),
            placeholders = profiles.iter().filter(|p| p.is_placeholder).count(),
            "Resolved profiles"
        );
        Ok(profiles)
    }
}

#[async_trait]
impl ProfileDirectory for ProfileRepository {
    async fn resolve_identities(&self, ids: &[UserId]) -> Result<Vec<Profile>, BackendError> {
        Ok(self.resolve(ids).await?)
    }
}
