use crate::utils::strip_accents;

/// Characters per input position (7-bit ASCII)
pub const ASCII_CHARS: usize = 128;
/// Leading query characters that reach the model
pub const INPUT_DIGITS: usize = 20;
/// Width of the model input
pub const INPUT_CHANNELS: usize = ASCII_CHARS * INPUT_DIGITS;

/// One-hot encoding of a query.
///
/// Accents are stripped, then each of the first [`INPUT_DIGITS`] characters
/// activates channel `position * 128 + (code % 128)`. Only active channel
/// indices are kept since at most 20 of 2560 inputs are non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEncoding {
    query: String,
    active: Vec<usize>,
}

impl QueryEncoding {
    pub fn encode(query: &str) -> Self {
        let active = strip_accents(query)
            .chars()
            .take(INPUT_DIGITS)
            .enumerate()
            .map(|(position, c)| position * ASCII_CHARS + (c as usize) % ASCII_CHARS)
            .collect();

        Self {
            query: query.to_string(),
            active,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Indices of the channels set to 1.0, ascending
    pub fn active_channels(&self) -> &[usize] {
        &self.active
    }
}
