use super::encoding::QueryEncoding;
use super::model::{MlpRankingModel, RankingModel};
use super::Result;
use crate::config::RankerConfig;
use crate::models::{Owner, SearchResult};
use crate::services::buffer::IndexedBuffer;
use crate::services::debounce::DebounceHandle;
use crate::services::storage::{RankingSnapshot, RankingStorage, SnapshotStore};
use crate::utils::normalize_label;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Labels and model move together: a slot's weights only make sense for the
/// label currently living in that slot.
struct RankerState<M> {
    labels: IndexedBuffer<String>,
    model: M,
}

/// Per-owner ranker trained from result picks
pub struct ResultRanker<M: RankingModel = MlpRankingModel> {
    owner: Owner,
    output_units: usize,
    state: Mutex<RankerState<M>>,
    storage: RankingStorage,
}

impl<M: RankingModel> ResultRanker<M> {
    /// Restore the owner's ranking from `store`, or start fresh.
    ///
    /// A stored snapshot sized for a different number of output units is
    /// ignored. Failing to read the store or decode the stored model is an
    /// error: silently starting over would overwrite the stored state on the
    /// next training step.
    pub async fn load_or_init(
        store: Arc<dyn SnapshotStore>,
        owner: Owner,
        config: &RankerConfig,
    ) -> Result<Self> {
        let output_units = config.output_units;
        let storage = RankingStorage::new(store, config.debounce_interval());

        let state = match storage.load(&owner).await? {
            Some(snapshot) if snapshot.capacity == output_units => {
                let model = M::from_bytes(&snapshot.model)?;
                if model.output_units() == output_units {
                    let labels = IndexedBuffer::from_snapshot(
                        output_units,
                        snapshot.labels,
                        &snapshot.eviction_order,
                    )?;
                    info!(
                        owner = %owner,
                        labels = labels.len(),
                        saved_at = %snapshot.saved_at,
                        "Restored ranking state"
                    );
                    RankerState { labels, model }
                } else {
                    info!(
                        owner = %owner,
                        model_units = model.output_units(),
                        configured = output_units,
                        "Stored model width differs, starting fresh"
                    );
                    Self::fresh_state(output_units, config.rng_seed)
                }
            }
            Some(snapshot) => {
                info!(
                    owner = %owner,
                    stored = snapshot.capacity,
                    configured = output_units,
                    "Stored ranking capacity differs, starting fresh"
                );
                Self::fresh_state(output_units, config.rng_seed)
            }
            None => {
                info!(owner = %owner, output_units, "No stored ranking, starting fresh");
                Self::fresh_state(output_units, config.rng_seed)
            }
        };

        Ok(Self {
            owner,
            output_units,
            state: Mutex::new(state),
            storage,
        })
    }

    fn fresh_state(output_units: usize, seed: Option<u64>) -> RankerState<M> {
        RankerState {
            labels: IndexedBuffer::new(output_units),
            model: M::with_output_units(output_units, seed),
        }
    }

    /// Make results rankable. Returns how many new labels were added.
    ///
    /// Known labels keep their slot and recency. When the buffer is full the
    /// least recently used label is evicted and its slot wiped in the model
    /// before the new label can be trained on it.
    pub fn add_results(&self, results: &[SearchResult]) -> usize {
        let mut state = self.state.lock();
        let mut added = 0;

        for result in results {
            let label = normalize_label(&result.title);
            if label.is_empty() || state.labels.contains(label.as_str()) {
                continue;
            }

            if let Some(slot) = state.labels.insert(label) {
                if let Err(e) = state.model.reset_slot(slot) {
                    error!(owner = %self.owner, slot, error = %e, "Failed to reset evicted slot");
                }
                debug!(owner = %self.owner, slot, "Evicted least recently used label");
            }
            added += 1;
        }

        added
    }

    /// Learn that `selected` was picked for `query` and schedule a snapshot.
    ///
    /// Returns `None` when nothing was learned: the result was never added
    /// (or has been evicted since), or the model rejected the update.
    pub fn train_ranking(&self, query: &str, selected: &SearchResult) -> Option<DebounceHandle> {
        let label = normalize_label(&selected.title);
        let input = QueryEncoding::encode(query);

        let mut state = self.state.lock();

        let Some(slot) = state.labels.slot_of(label.as_str()) else {
            warn!(
                owner = %self.owner,
                label = %label,
                "Selected result is not a known label, skipping training"
            );
            return None;
        };

        if let Err(e) = state.model.train(&input, slot) {
            error!(owner = %self.owner, slot, error = %e, "Ranking model training failed");
            return None;
        }
        state.labels.touch(label.as_str());

        let snapshot = match self.snapshot(&state) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(owner = %self.owner, error = %e, "Failed to capture ranking snapshot");
                return None;
            }
        };

        debug!(owner = %self.owner, label = %label, "Trained ranking");
        // Submit under the lock so submission order matches training order
        Some(self.storage.persist(snapshot))
    }

    /// Order `candidates` by learned preference for `query`.
    ///
    /// Candidates the ranker has never seen keep their relative order after
    /// every known one. Equal scores keep input order.
    pub fn rank(&self, query: &str, candidates: Vec<SearchResult>) -> Vec<SearchResult> {
        let input = QueryEncoding::encode(query);
        let state = self.state.lock();

        let scores = match state.model.predict(&input) {
            Ok(scores) => scores,
            Err(e) => {
                warn!(owner = %self.owner, error = %e, "Ranking prediction failed, keeping input order");
                return candidates;
            }
        };

        let mut known = Vec::with_capacity(candidates.len());
        let mut unknown = Vec::new();
        for candidate in candidates {
            let label = normalize_label(&candidate.title);
            match state
                .labels
                .slot_of(label.as_str())
                .and_then(|slot| scores.get(slot).copied())
            {
                Some(score) => {
                    let score = if score.is_nan() { f32::NEG_INFINITY } else { score };
                    known.push((score, candidate));
                }
                None => unknown.push(candidate),
            }
        }
        drop(state);

        // 按分數降序排序
        known.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        known
            .into_iter()
            .map(|(_, candidate)| candidate)
            .chain(unknown)
            .collect()
    }

    fn snapshot(&self, state: &RankerState<M>) -> Result<RankingSnapshot> {
        Ok(RankingSnapshot::new(
            &self.owner,
            self.output_units,
            state.labels.labels_in_slot_order(),
            state.labels.eviction_order(),
            state.model.to_bytes()?,
        ))
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn output_units(&self) -> usize {
        self.output_units
    }

    /// Known labels indexed by slot
    pub fn known_labels(&self) -> Vec<String> {
        self.state.lock().labels.labels_in_slot_order()
    }

    pub fn slot_of(&self, title: &str) -> Option<usize> {
        self.state.lock().labels.slot_of(normalize_label(title).as_str())
    }

    /// Labels from least to most recently used
    pub fn eviction_order(&self) -> Vec<String> {
        self.state.lock().labels.eviction_order()
    }

    /// Run `f` against the model while holding the state lock
    pub fn inspect_model<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&self.state.lock().model)
    }

    /// Flush any pending snapshot and stop persisting
    pub async fn shutdown(&self, timeout: Duration) {
        info!(owner = %self.owner, "Shutting down ranker");
        self.storage.shutdown(timeout).await;
    }
}
