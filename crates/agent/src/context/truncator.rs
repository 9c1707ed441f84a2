//! History truncation against a model context limit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use tandem_config::ChatConfig;
use tandem_core::estimate::{estimate_history_tokens, estimate_tokens, estimate_turn_tokens};
use tandem_core::{Content, Part, Role, Turn};
use tandem_tools::bound_value;

const CUT_MARKER: &str = "…[truncated]";

/// Knobs for a single truncation pass.
#[derive(Debug, Clone)]
pub struct TruncateOptions {
    /// Tokens held back for the model's response.
    pub reserve_for_response: usize,
    /// Tokens held back for the system prompt the backend will lift out.
    pub reserve_for_system_prompt: usize,
    /// Tokens held back for tool definitions. Zero when tools are
    /// disabled for the call.
    pub reserve_for_tool_definitions: usize,
    /// Extra slack against estimator variance.
    pub safety_buffer_tokens: usize,
    /// The protected tail is never smaller than this many turns.
    pub minimum_turns_to_keep: usize,
    /// Individual turns above this estimate are shrunk in place.
    pub per_turn_token_ceiling: usize,
}

impl Default for TruncateOptions {
    fn default() -> Self {
        Self {
            reserve_for_response: 1024,
            reserve_for_system_prompt: 512,
            reserve_for_tool_definitions: 512,
            safety_buffer_tokens: 256,
            minimum_turns_to_keep: 4,
            per_turn_token_ceiling: 4000,
        }
    }
}

impl TruncateOptions {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            reserve_for_response: config.truncation.reserve_for_response,
            reserve_for_system_prompt: config.truncation.reserve_for_system_prompt,
            reserve_for_tool_definitions: config.truncation.reserve_for_tool_definitions,
            safety_buffer_tokens: config.truncation.safety_buffer_tokens,
            minimum_turns_to_keep: config.truncation.minimum_turns_to_keep,
            per_turn_token_ceiling: config.limits.tool_result_token_ceiling,
        }
    }

    fn reserved(&self) -> usize {
        self.reserve_for_response
            + self.reserve_for_system_prompt
            + self.reserve_for_tool_definitions
            + self.safety_buffer_tokens
    }
}

/// What a truncation pass did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationReport {
    pub original_turn_count: usize,
    pub final_turn_count: usize,
    pub original_token_estimate: usize,
    pub final_token_estimate: usize,
    pub removed_turn_count: usize,
    /// Even the protected tail exceeds budget. The caller sends it
    /// anyway and handles overflow at the backend boundary.
    pub still_over_budget: bool,
}

/// Shrink `turns` to fit `model_context_limit` minus reserves.
///
/// System turns are always kept. The protected tail always includes the
/// most recent user turn and never holds fewer than
/// `minimum_turns_to_keep` turns; the removable middle is dropped oldest
/// first. Relative order is preserved and the pass never fails.
pub fn truncate(
    turns: &[Turn],
    model_context_limit: usize,
    options: &TruncateOptions,
) -> (Vec<Turn>, TruncationReport) {
    let original_turn_count = turns.len();
    let original_token_estimate = estimate_history_tokens(turns);
    let available = model_context_limit.saturating_sub(options.reserved());

    let mut kept: Vec<Turn> = turns.to_vec();
    for turn in &mut kept {
        shrink_turn(turn, options.per_turn_token_ceiling);
    }

    let mut total = estimate_history_tokens(&kept);
    if total <= available {
        let report = TruncationReport {
            original_turn_count,
            final_turn_count: kept.len(),
            original_token_estimate,
            final_token_estimate: total,
            removed_turn_count: 0,
            still_over_budget: false,
        };
        return (kept, report);
    }

    // The tail covers the last minimum_turns_to_keep turns, widened to
    // reach back to the most recent user turn if that lies earlier.
    let len = kept.len();
    let mut tail_start = len.saturating_sub(options.minimum_turns_to_keep.max(1));
    if let Some(user_idx) = kept.iter().rposition(|t| t.role == Role::User)
        && user_idx < tail_start
    {
        tail_start = user_idx;
    }

    let mut removed = vec![false; len];
    let mut removed_turn_count = 0;
    for idx in 0..tail_start {
        if total <= available {
            break;
        }
        if kept[idx].role == Role::System {
            continue;
        }
        total = total.saturating_sub(estimate_turn_tokens(&kept[idx]));
        removed[idx] = true;
        removed_turn_count += 1;
    }

    let kept: Vec<Turn> = kept
        .into_iter()
        .zip(removed)
        .filter_map(|(turn, gone)| (!gone).then_some(turn))
        .collect();

    let final_token_estimate = estimate_history_tokens(&kept);
    let report = TruncationReport {
        original_turn_count,
        final_turn_count: kept.len(),
        original_token_estimate,
        final_token_estimate,
        removed_turn_count,
        still_over_budget: final_token_estimate > available,
    };

    if report.removed_turn_count > 0 {
        debug!(
            removed = report.removed_turn_count,
            before = report.original_token_estimate,
            after = report.final_token_estimate,
            "Truncated history"
        );
    }

    (kept, report)
}

/// Shrink one oversized turn in place. Tool-result outputs go through
/// the structured summarizer; plain text gets a hard cut.
fn shrink_turn(turn: &mut Turn, ceiling: usize) {
    if estimate_turn_tokens(turn) <= ceiling {
        return;
    }

    let mut changed = false;
    match &mut turn.content {
        Content::Text(text) => {
            changed = cut_text(text, ceiling);
        }
        Content::Parts(parts) => {
            for part in parts.iter_mut() {
                match part {
                    Part::ToolResult { output, .. } => {
                        let (bounded, truncated) = bound_value(output.take(), ceiling);
                        *output = bounded;
                        changed |= truncated;
                    }
                    Part::Text { text } if estimate_tokens(text) > ceiling => {
                        changed |= cut_text(text, ceiling);
                    }
                    _ => {}
                }
            }
        }
    }

    if changed {
        turn.mark_truncated();
    }
}

fn cut_text(text: &mut String, ceiling: usize) -> bool {
    // 4 chars/token, shaved a tenth so the margin-padded estimate of
    // the cut text still lands under the ceiling.
    let max_chars = (ceiling * 4 * 9 / 10)
        .saturating_sub(CUT_MARKER.len())
        .max(16);
    if text.chars().count() <= max_chars {
        return false;
    }
    let cut: String = text.chars().take(max_chars).collect();
    *text = format!("{cut}{CUT_MARKER}");
    true
}
