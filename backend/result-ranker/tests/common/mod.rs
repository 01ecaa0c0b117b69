#![allow(dead_code)]

use async_trait::async_trait;
use result_ranker::config::RankerConfig;
use result_ranker::services::ranking::{QueryEncoding, RankingError};
use result_ranker::services::storage::StorageResult;
use result_ranker::{Owner, RankingModel, RankingSnapshot, SearchResult, SnapshotStore, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelEvent {
    Train(usize),
    Reset(usize),
}

/// Deterministic model: each pick adds 1.0 to the slot's score for that exact query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountingModel {
    units: usize,
    scores: HashMap<String, Vec<f32>>,
    #[serde(skip)]
    pub events: Vec<ModelEvent>,
}

impl CountingModel {
    fn check(&self, slot: usize) -> Result<(), RankingError> {
        if slot >= self.units {
            return Err(RankingError::InvalidInput(format!("slot {}", slot)));
        }
        Ok(())
    }

    pub fn score(&self, query: &str, slot: usize) -> f32 {
        self.scores.get(query).map(|s| s[slot]).unwrap_or(0.0)
    }
}

impl RankingModel for CountingModel {
    fn with_output_units(units: usize, _seed: Option<u64>) -> Self {
        Self {
            units,
            scores: HashMap::new(),
            events: Vec::new(),
        }
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RankingError> {
        serde_json::from_slice(bytes).map_err(|e| RankingError::Model(e.to_string()))
    }

    fn to_bytes(&self) -> Result<Vec<u8>, RankingError> {
        serde_json::to_vec(self).map_err(|e| RankingError::Model(e.to_string()))
    }

    fn output_units(&self) -> usize {
        self.units
    }

    fn train(&mut self, input: &QueryEncoding, slot: usize) -> Result<(), RankingError> {
        self.check(slot)?;
        let units = self.units;
        self.scores
            .entry(input.query().to_string())
            .or_insert_with(|| vec![0.0; units])[slot] += 1.0;
        self.events.push(ModelEvent::Train(slot));
        Ok(())
    }

    fn predict(&self, input: &QueryEncoding) -> Result<Vec<f32>, RankingError> {
        Ok(self
            .scores
            .get(input.query())
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.units]))
    }

    fn reset_slot(&mut self, slot: usize) -> Result<(), RankingError> {
        self.check(slot)?;
        for scores in self.scores.values_mut() {
            scores[slot] = 0.0;
        }
        self.events.push(ModelEvent::Reset(slot));
        Ok(())
    }
}

/// Store whose backend is down
pub struct FailingStore;

#[async_trait]
impl SnapshotStore for FailingStore {
    async fn store(&self, _snapshot: &RankingSnapshot) -> StorageResult<()> {
        Err(StorageError::Corrupt("backend unavailable".to_string()))
    }

    async fn load(&self, _owner: &Owner) -> StorageResult<Option<RankingSnapshot>> {
        Err(StorageError::Corrupt("backend unavailable".to_string()))
    }
}

/// Store that reads fine but refuses every write
pub struct ReadOnlyStore;

#[async_trait]
impl SnapshotStore for ReadOnlyStore {
    async fn store(&self, _snapshot: &RankingSnapshot) -> StorageResult<()> {
        Err(StorageError::Serialization("read-only".to_string()))
    }

    async fn load(&self, _owner: &Owner) -> StorageResult<Option<RankingSnapshot>> {
        Ok(None)
    }
}

pub fn config(output_units: usize, debounce_ms: u64) -> RankerConfig {
    RankerConfig::default()
        .with_output_units(output_units)
        .with_debounce_interval(Duration::from_millis(debounce_ms))
        .with_rng_seed(2024)
}

pub fn results(titles: &[&str]) -> Vec<SearchResult> {
    titles.iter().map(|t| SearchResult::new(*t)).collect()
}

pub fn titles(ranked: &[SearchResult]) -> Vec<String> {
    ranked.iter().map(|r| r.title.clone()).collect()
}
