//! Context-pressure estimation for chat turns.
//!
//! The estimate is a cheap length heuristic (a fixed characters-per-token
//! divisor), documented as approximate; it is not a tokenizer. The signal
//! is advisory only and never shortens the actual model input.

use serde::Serialize;

use revline_store::models::ChatMessage;

use super::ChatConfig;

/// Derived context-pressure signal for one prospective model call.
/// Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContextUsage {
    /// Approximate tokens the call would consume.
    pub used: i64,
    /// The model context budget, in the same approximate tokens.
    pub limit: i64,
    pub percent: f64,
    /// True once `percent` crosses the warning ratio. Advisory only.
    pub warning: bool,
}

/// Estimate context usage for `system_prompt` + `history` + `new_message`.
///
/// `used` is the total character length divided by the configured
/// characters-per-token (integer division).
pub fn compute_context_usage(
    system_prompt: &str,
    history: &[ChatMessage],
    new_message: &str,
    config: &ChatConfig,
) -> ContextUsage {
    let history_len: usize = history.iter().map(|m| m.content.len()).sum();
    let total_len = system_prompt.len() + history_len + new_message.len();

    let used = (total_len / config.chars_per_token) as i64;
    let percent = used as f64 / config.context_limit as f64;
    ContextUsage {
        used,
        limit: config.context_limit,
        percent,
        warning: percent >= config.warning_ratio,
    }
}
