pub mod buffer;
pub mod debounce;
pub mod ranking;
pub mod storage;

pub use buffer::{BufferError, IndexedBuffer};
pub use debounce::{DebounceHandle, Debouncer};
pub use ranking::{MlpRankingModel, QueryEncoding, RankingError, RankingModel, ResultRanker};
pub use storage::{
    build_store, InMemorySnapshotStore, RankingSnapshot, RankingStorage, RedisSnapshotStore,
    SnapshotStore, StorageError,
};
