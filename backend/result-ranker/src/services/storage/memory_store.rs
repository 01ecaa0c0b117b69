use super::{RankingSnapshot, SnapshotStore, StorageResult};
use crate::models::Owner;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local snapshot store keyed by owner name.
///
/// Nothing survives a restart; useful for development and tests.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<String, RankingSnapshot>>,
    writes: AtomicUsize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `store` calls so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn stored(&self, owner: &str) -> Option<RankingSnapshot> {
        self.snapshots.read().await.get(owner).cloned()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn store(&self, snapshot: &RankingSnapshot) -> StorageResult<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.owner.name.clone(), snapshot.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(owner = %snapshot.owner, "Stored ranking snapshot in memory");
        Ok(())
    }

    async fn load(&self, owner: &Owner) -> StorageResult<Option<RankingSnapshot>> {
        Ok(self.stored(&owner.name).await)
    }
}
