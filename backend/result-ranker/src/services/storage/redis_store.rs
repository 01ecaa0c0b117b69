use super::{RankingSnapshot, SnapshotStore, StorageError, StorageResult};
use crate::models::Owner;
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info};

/// Key suffix shared by every owner without a ranking of their own
pub const DEFAULT_RANKING_KEY: &str = "default-neural-network-rankings";

/// Role that always gets a private ranking
pub const SUPERUSER_ROLE: &str = "superuser";

/// How an owner maps to a Redis key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Every owner gets `{prefix}:{owner}`
    Username,
    /// Holders of `ranking_role` (or superusers) get `{prefix}:{owner}`,
    /// everyone else shares `{prefix}:default-neural-network-rankings`
    UserRole { ranking_role: String },
}

/// Snapshot store backed by Redis, one JSON document per key
pub struct RedisSnapshotStore {
    redis: redis::Client,
    key_prefix: String,
    strategy: KeyStrategy,
}

impl RedisSnapshotStore {
    pub fn new(redis: redis::Client, key_prefix: impl Into<String>, strategy: KeyStrategy) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
            strategy,
        }
    }

    pub fn snapshot_key(&self, owner: &Owner) -> String {
        let name = match &self.strategy {
            KeyStrategy::Username => owner.name.as_str(),
            KeyStrategy::UserRole { ranking_role } => {
                if owner.has_role(ranking_role) || owner.has_role(SUPERUSER_ROLE) {
                    owner.name.as_str()
                } else {
                    DEFAULT_RANKING_KEY
                }
            }
        };
        format!("{}:{}", self.key_prefix, name)
    }
}

#[async_trait]
impl SnapshotStore for RedisSnapshotStore {
    async fn store(&self, snapshot: &RankingSnapshot) -> StorageResult<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let key = self.snapshot_key(&snapshot.owner);

        let json = serde_json::to_string(snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let _: () = conn.set(&key, json).await?;

        debug!(key = %key, bytes = snapshot.model.len(), "Stored ranking snapshot");
        Ok(())
    }

    async fn load(&self, owner: &Owner) -> StorageResult<Option<RankingSnapshot>> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let key = self.snapshot_key(owner);

        let raw: Option<String> = conn.get(&key).await?;
        let Some(raw) = raw else {
            info!(owner = %owner, key = %key, "No stored ranking snapshot");
            return Ok(None);
        };

        let snapshot = serde_json::from_str(&raw)
            .map_err(|e| StorageError::Corrupt(format!("{}: {}", key, e)))?;
        Ok(Some(snapshot))
    }
}
