//! Budget policy for the context window

use crate::error::{ContextError, ContextResult};

/// Share of the advertised input budget a conversation may use before summarization.
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.8;

/// Adapted messages kept when summarization fails.
pub const DEFAULT_TRUNCATE_KEEP: usize = 4;

pub const DEFAULT_SUMMARY_PREFIX: &str = "Previous conversation summary: ";

/// Budget policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetPolicy {
    /// Fraction of `max_input_tokens` allowed before summarizing
    pub threshold_ratio: f64,
    /// Trailing adapted messages kept by the truncation fallback
    pub truncate_keep: usize,
    /// Text placed in front of the generated summary
    pub summary_prefix: String,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            truncate_keep: DEFAULT_TRUNCATE_KEEP,
            summary_prefix: DEFAULT_SUMMARY_PREFIX.to_string(),
        }
    }
}

impl BudgetPolicy {
    pub fn new(threshold_ratio: f64) -> ContextResult<Self> {
        if !(threshold_ratio > 0.0 && threshold_ratio <= 1.0) {
            return Err(ContextError::InvalidPolicy(format!(
                "threshold ratio must be in (0, 1], got {threshold_ratio}"
            )));
        }

        Ok(Self {
            threshold_ratio,
            ..Default::default()
        })
    }

    /// Largest token count that still fits without summarization.
    pub fn threshold(&self, max_input_tokens: usize) -> usize {
        (max_input_tokens as f64 * self.threshold_ratio).floor() as usize
    }
}
