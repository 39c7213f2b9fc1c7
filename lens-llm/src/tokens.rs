//! Token estimation.
//!
//! Providers tokenize differently and none of them expose a tokenizer we
//! can call offline, so budgeting uses a length heuristic: split on
//! whitespace, split each word again on common punctuation, count the
//! non-empty pieces. It overestimates short words and underestimates long
//! ones; the budget leaves enough headroom for both.

use crate::types::LlmMessage;

/// Characters that start a new token inside a whitespace-separated word.
pub const PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '-', '—', '(', ')', '[', ']', '{', '}', '"', '\'',
];

/// Fixed framing cost per message (role marker, separators).
pub const MESSAGE_OVERHEAD: usize = 4;

/// Counts tokens in a piece of text.
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count for `text`.
    fn estimate(&self, text: &str) -> usize;
}

/// The whitespace + punctuation heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// Estimated token count of `text`.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace()
        .flat_map(|word| word.split(PUNCTUATION))
        .filter(|piece| !piece.is_empty())
        .count()
}

/// Estimated size of a conversation: each message's stored estimate plus
/// [`MESSAGE_OVERHEAD`]. Nothing is re-tokenized.
#[must_use]
pub fn estimate_combined_tokens(messages: &[LlmMessage]) -> usize {
    messages
        .iter()
        .map(|m| m.estimated_tokens() + MESSAGE_OVERHEAD)
        .sum()
}
