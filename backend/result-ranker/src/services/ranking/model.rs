/// Online Ranking Model Module
///
/// A two-layer network mapping an encoded query to one score per output slot.
/// Trained one example at a time with softmax cross-entropy, so a slot that
/// keeps getting picked for a query climbs to the top for similar queries.
use super::encoding::{QueryEncoding, INPUT_CHANNELS, INPUT_DIGITS};
use super::{RankingError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Width of the hidden layer in front of the output units
pub const HIDDEN_UNITS: usize = 100;

const DEFAULT_LEARNING_RATE: f32 = 0.1;

/// Capability the ranker needs from a model.
///
/// Slots are the buffer's slot numbers; the model has exactly
/// `output_units()` of them and any slot outside that range is an error.
pub trait RankingModel: Send + Sized + 'static {
    /// Fresh, untrained model. A fixed `seed` makes initialization repeatable.
    fn with_output_units(output_units: usize, seed: Option<u64>) -> Self;

    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    fn to_bytes(&self) -> Result<Vec<u8>>;

    fn output_units(&self) -> usize;

    /// One supervised step: `input` should score highest on `slot`
    fn train(&mut self, input: &QueryEncoding, slot: usize) -> Result<()>;

    /// One score per slot, higher is better
    fn predict(&self, input: &QueryEncoding) -> Result<Vec<f32>>;

    /// Forget everything learned about `slot`
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
}

/// Default [`RankingModel`]: sparse one-hot input → tanh hidden layer → softmax
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpRankingModel {
    /// hidden × input channels
    hidden_weights: Array2<f32>,
    hidden_bias: Array1<f32>,
    /// output units × hidden
    output_weights: Array2<f32>,
    output_bias: Array1<f32>,
    learning_rate: f32,
}

struct Activations {
    hidden: Array1<f32>,
    probabilities: Array1<f32>,
}

impl MlpRankingModel {
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.output_units() {
            return Err(RankingError::InvalidInput(format!(
                "Slot {} out of range for {} output units",
                slot,
                self.output_units()
            )));
        }
        Ok(())
    }

    fn forward(&self, input: &QueryEncoding) -> Activations {
        // Input is one-hot, so the first layer is a sum of active columns
        let mut hidden = self.hidden_bias.clone();
        for &channel in input.active_channels() {
            hidden += &self.hidden_weights.column(channel);
        }
        hidden.mapv_inplace(f32::tanh);

        let logits = self.output_weights.dot(&hidden) + &self.output_bias;

        Activations {
            hidden,
            probabilities: softmax(logits),
        }
    }

    fn validate_shapes(&self) -> Result<()> {
        let hidden = self.hidden_bias.len();
        let consistent = hidden > 0
            && self.hidden_weights.dim() == (hidden, INPUT_CHANNELS)
            && self.output_weights.ncols() == hidden
            && self.output_bias.len() == self.output_weights.nrows()
            && self.output_bias.len() > 0;

        if !consistent {
            return Err(RankingError::Model(format!(
                "Inconsistent model shapes: hidden {:?}, output {:?}",
                self.hidden_weights.dim(),
                self.output_weights.dim()
            )));
        }
        Ok(())
    }
}

impl RankingModel for MlpRankingModel {
    fn with_output_units(output_units: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // At most INPUT_DIGITS inputs are active at once
        let hidden_limit = (6.0 / (INPUT_DIGITS + HIDDEN_UNITS) as f32).sqrt();
        let output_limit = (3.0 / HIDDEN_UNITS as f32).sqrt();
        let hidden_dist = Uniform::new_inclusive(-hidden_limit, hidden_limit);
        let output_dist = Uniform::new_inclusive(-output_limit, output_limit);

        let hidden_weights =
            Array2::from_shape_fn((HIDDEN_UNITS, INPUT_CHANNELS), |_| hidden_dist.sample(&mut rng));
        let output_weights =
            Array2::from_shape_fn((output_units, HIDDEN_UNITS), |_| output_dist.sample(&mut rng));

        debug!(output_units, hidden_units = HIDDEN_UNITS, "Initialized ranking model");

        Self {
            hidden_weights,
            hidden_bias: Array1::zeros(HIDDEN_UNITS),
            output_weights,
            output_bias: Array1::zeros(output_units),
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: Self = rmp_serde::from_slice(bytes)
            .map_err(|e| RankingError::Model(format!("Failed to decode model: {}", e)))?;
        model.validate_shapes()?;
        Ok(model)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| RankingError::Model(format!("Failed to encode model: {}", e)))
    }

    fn output_units(&self) -> usize {
        self.output_bias.len()
    }

    fn train(&mut self, input: &QueryEncoding, slot: usize) -> Result<()> {
        self.check_slot(slot)?;

        let Activations {
            hidden,
            probabilities,
        } = self.forward(input);

        // d(loss)/d(logits) for softmax cross-entropy
        let mut delta = probabilities;
        delta[slot] -= 1.0;

        // Backpropagate before the output layer moves
        let hidden_grad =
            self.output_weights.t().dot(&delta) * hidden.mapv(|h| 1.0 - h * h);

        let lr = self.learning_rate;
        for (mut row, &d) in self
            .output_weights
            .axis_iter_mut(Axis(0))
            .zip(delta.iter())
        {
            row.scaled_add(-lr * d, &hidden);
        }
        self.output_bias.scaled_add(-lr, &delta);

        for &channel in input.active_channels() {
            self.hidden_weights
                .column_mut(channel)
                .scaled_add(-lr, &hidden_grad);
        }
        self.hidden_bias.scaled_add(-lr, &hidden_grad);

        Ok(())
    }

    fn predict(&self, input: &QueryEncoding) -> Result<Vec<f32>> {
        Ok(self.forward(input).probabilities.to_vec())
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;

        self.output_weights.row_mut(slot).fill(0.0);
        // Start below every live slot instead of at the average
        let floor = self.output_bias.iter().copied().fold(f32::INFINITY, f32::min);
        self.output_bias[slot] = floor;

        Ok(())
    }
}

fn softmax(logits: Array1<f32>) -> Array1<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut exp = logits.mapv(|z| (z - max).exp());
    let sum = exp.sum();
    if sum > 0.0 {
        exp /= sum;
    }
    exp
}
