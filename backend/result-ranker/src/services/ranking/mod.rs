/// Ranking Module
///
/// Learns which result a user picks for a query and orders future results
/// accordingly.
///
/// # Architecture
/// - **Encoding Layer**: query text → sparse one-hot input (`encoding`)
/// - **Model Layer**: per-slot scores from an online-trained network (`model`)
/// - **Orchestration Layer**: label slots, eviction resets, debounced
///   persistence (`ranker`)
///
/// # Workflow
/// 1. `add_results` assigns each new label an output slot, resetting evicted slots
/// 2. `train_ranking` teaches the model the picked slot and schedules a snapshot
/// 3. `rank` orders candidates by their slot score, unknown labels last
pub mod encoding;
pub mod model;
pub mod ranker;

pub use encoding::QueryEncoding;
pub use model::{MlpRankingModel, RankingModel};
pub use ranker::ResultRanker;

use crate::services::buffer::BufferError;
use crate::services::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Ranking storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Ranking snapshot is inconsistent: {0}")]
    Buffer(#[from] BufferError),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, RankingError>;
