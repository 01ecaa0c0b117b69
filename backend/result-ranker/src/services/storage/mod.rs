// ============================================
// Ranking Storage (排序狀態存儲)
// ============================================
//
// Persists ranking snapshots (model + label buffer) per owner.
//
// Writes are debounced: every training step asks for a snapshot to be saved,
// but only the latest one per interval reaches the store. Loads go straight
// to the store.

pub mod memory_store;
pub mod redis_store;

pub use memory_store::InMemorySnapshotStore;
pub use redis_store::{KeyStrategy, RedisSnapshotStore};

use crate::config::{Config, StorageStrategy};
use crate::models::Owner;
use crate::services::debounce::{DebounceHandle, Debouncer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Everything needed to rebuild a ranker, captured at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub owner: Owner,
    /// Output units of the model, also the label buffer capacity
    pub capacity: usize,
    /// `labels[slot]`
    pub labels: Vec<String>,
    /// Least recently used first
    pub eviction_order: Vec<String>,
    /// Serialized model
    #[serde(with = "model_blob")]
    pub model: Vec<u8>,
    pub saved_at: DateTime<Utc>,
}

impl RankingSnapshot {
    pub fn new(
        owner: &Owner,
        capacity: usize,
        labels: Vec<String>,
        eviction_order: Vec<String>,
        model: Vec<u8>,
    ) -> Self {
        Self {
            owner: owner.clone(),
            capacity,
            labels,
            eviction_order,
            model,
            saved_at: Utc::now(),
        }
    }
}

/// Model bytes travel as base64 inside the JSON document
mod model_blob {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Backend that keeps one snapshot per owner
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the owner's snapshot
    async fn store(&self, snapshot: &RankingSnapshot) -> StorageResult<()>;

    /// Latest snapshot for the owner, `None` if nothing was ever stored
    async fn load(&self, owner: &Owner) -> StorageResult<Option<RankingSnapshot>>;
}

/// Store front with debounced writes
pub struct RankingStorage {
    store: Arc<dyn SnapshotStore>,
    debouncer: Debouncer,
}

impl RankingStorage {
    /// Must be called inside a tokio runtime, the debounce worker is spawned here
    pub fn new(store: Arc<dyn SnapshotStore>, debounce_interval: Duration) -> Self {
        Self {
            store,
            debouncer: Debouncer::new(debounce_interval),
        }
    }

    /// Schedule a write. Returns immediately; store failures are logged.
    pub fn persist(&self, snapshot: RankingSnapshot) -> DebounceHandle {
        let store = Arc::clone(&self.store);

        self.debouncer.submit(async move {
            match store.store(&snapshot).await {
                Ok(()) => debug!(
                    owner = %snapshot.owner,
                    labels = snapshot.labels.len(),
                    "Persisted ranking snapshot"
                ),
                Err(e) => error!(
                    owner = %snapshot.owner,
                    error = %e,
                    "Failed to persist ranking snapshot"
                ),
            }
        })
    }

    pub async fn load(&self, owner: &Owner) -> StorageResult<Option<RankingSnapshot>> {
        self.store.load(owner).await
    }

    /// Flush the pending write and stop the debounce worker
    pub async fn shutdown(&self, timeout: Duration) {
        self.debouncer.shutdown(timeout).await;
    }
}

/// Build the store selected by configuration
pub fn build_store(config: &Config) -> StorageResult<Arc<dyn SnapshotStore>> {
    let strategy = config.ranker.storage_strategy();
    info!(?strategy, "Ranking storage selected");

    let key_strategy = match strategy {
        StorageStrategy::Memory => return Ok(Arc::new(InMemorySnapshotStore::new())),
        StorageStrategy::Username => KeyStrategy::Username,
        StorageStrategy::UserRole => KeyStrategy::UserRole {
            ranking_role: config.ranker.ranking_role.clone(),
        },
    };

    let client = redis::Client::open(config.redis.url.as_str())?;
    Ok(Arc::new(RedisSnapshotStore::new(
        client,
        config.ranker.key_prefix.clone(),
        key_strategy,
    )))
}
