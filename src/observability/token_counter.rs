use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tracing::{info, warn};

use crate::config::TokenCounterMode;

/// Prompt/completion token totals reported to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Approximate token counter.
///
/// Uses the `cl100k_base` byte-pair encoding when it can be loaded at startup
/// and a CJK-aware word heuristic otherwise. The choice is fixed for the
/// lifetime of the estimator.
pub struct TokenEstimator {
    bpe: Option<CoreBPE>,
}

impl TokenEstimator {
    #[must_use]
    pub fn new(mode: TokenCounterMode) -> Self {
        let bpe = match mode {
            TokenCounterMode::Heuristic => None,
            TokenCounterMode::Bpe => match tiktoken_rs::cl100k_base() {
                Ok(bpe) => Some(bpe),
                Err(err) => {
                    warn!(error = %err, "failed to load BPE tokenizer, using heuristic token count");
                    None
                }
            },
        };
        Self { bpe }
    }

    /// Estimator that never loads the BPE tables.
    #[must_use]
    pub fn heuristic() -> Self {
        Self::new(TokenCounterMode::Heuristic)
    }

    /// Count tokens in `text`; 0 for empty input.
    #[must_use]
    pub fn count(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        match self.bpe.as_ref() {
            Some(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
            None => estimate_tokens_heuristic(text),
        }
    }

    /// Name of the active counting method.
    #[must_use]
    pub fn method(&self) -> &'static str {
        if self.bpe.is_some() {
            "bpe"
        } else {
            "heuristic"
        }
    }
}

#[inline]
fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Two units per CJK ideograph plus one per whitespace-delimited word.
#[must_use]
pub fn estimate_tokens_heuristic(text: &str) -> u64 {
    let ideographs = text.chars().filter(|c| is_cjk_ideograph(*c)).count() as u64;
    let words = text.split_whitespace().count() as u64;
    ideographs * 2 + words
}

/// Log token usage for a completed request at INFO level.
pub fn log_request_usage(model: &str, usage: &TokenUsage, duration: Duration) {
    info!(
        model = model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_seconds = duration.as_secs_f64(),
        "request completed"
    );
}
