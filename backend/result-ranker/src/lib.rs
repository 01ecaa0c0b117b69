pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use models::{Owner, SearchResult};
pub use services::{
    build_store, DebounceHandle, Debouncer, IndexedBuffer, MlpRankingModel, RankingError,
    RankingModel, RankingSnapshot, ResultRanker, SnapshotStore, StorageError,
};
