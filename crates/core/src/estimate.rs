//! Heuristic token estimation.
//!
//! A fast character-based approximation (roughly 4 characters per token
//! for English and code) padded with a safety margin so the estimate
//! errs high. Budget decisions built on these numbers must tolerate
//! overestimation, never underestimation. No tokenizer dependency and
//! no failure path: estimation always succeeds.

use crate::tool::ToolDefinition;
use crate::turn::{Content, Part, Turn};

/// Flat cost charged for an image part regardless of its size.
pub const IMAGE_TOKEN_COST: usize = 1600;

/// Per-turn overhead for role markers and wire framing.
const TURN_OVERHEAD_TOKENS: usize = 4;

/// Estimate tokens for a piece of text.
///
/// `ceil(len / 4)` plus a 5% margin and a small flat pad. Empty text
/// costs nothing.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let base = text.len().div_ceil(4);
    base + base / 20 + 1
}

/// Estimate tokens for an arbitrary JSON value via its serialized form.
pub fn estimate_value_tokens(value: &serde_json::Value) -> usize {
    match serde_json::to_string(value) {
        Ok(s) => estimate_tokens(&s),
        Err(_) => 0,
    }
}

fn estimate_part_tokens(part: &Part) -> usize {
    match part {
        Part::Text { text } => estimate_tokens(text),
        Part::Image { .. } => IMAGE_TOKEN_COST,
        Part::ToolUse { id, name, input } => {
            estimate_tokens(id) + estimate_tokens(name) + estimate_value_tokens(input)
        }
        Part::ToolResult {
            tool_use_id,
            output,
            ..
        } => estimate_tokens(tool_use_id) + estimate_value_tokens(output),
    }
}

/// Estimate tokens for a full turn, including framing overhead.
pub fn estimate_turn_tokens(turn: &Turn) -> usize {
    let content = match &turn.content {
        Content::Text(text) => estimate_tokens(text),
        Content::Parts(parts) => parts.iter().map(estimate_part_tokens).sum(),
    };
    content + TURN_OVERHEAD_TOKENS
}

/// Estimate total tokens for a sequence of turns.
pub fn estimate_history_tokens(turns: &[Turn]) -> usize {
    turns.iter().map(estimate_turn_tokens).sum()
}

/// Estimate tokens consumed by tool definitions in a request.
pub fn estimate_tool_tokens(tools: &[ToolDefinition]) -> usize {
    tools
        .iter()
        .map(|t| match serde_json::to_string(t) {
            Ok(s) => estimate_tokens(&s),
            Err(_) => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_text_costs_nothing() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up_and_pads() {
        // 5 chars: ceil(5/4) = 2, margin 0, pad 1
        assert_eq!(estimate_tokens("12345"), 3);
    }

    #[test]
    fn estimate_is_monotone_under_concatenation() {
        let a = "the quick brown fox";
        let b = " jumps over the lazy dog";
        let joined = format!("{a}{b}");
        assert!(estimate_tokens(&joined) >= estimate_tokens(a));
        assert!(estimate_tokens(&joined) >= estimate_tokens(b));
    }

    #[test]
    fn long_text_carries_margin() {
        let text = "x".repeat(4000);
        // base 1000, margin 50, pad 1
        assert_eq!(estimate_tokens(&text), 1051);
    }

    #[test]
    fn image_part_has_flat_cost() {
        let turn = Turn::user(crate::turn::Content::Parts(vec![Part::Image {
            source: "attachment://photo.png".into(),
        }]));
        assert_eq!(estimate_turn_tokens(&turn), IMAGE_TOKEN_COST + 4);
    }

    #[test]
    fn turn_overhead_applies_to_empty_turn() {
        let turn = Turn::user("");
        assert_eq!(estimate_turn_tokens(&turn), 4);
    }

    #[test]
    fn tool_definitions_estimated_over_serialized_schemas() {
        let small = ToolDefinition {
            name: "ping".into(),
            description: "Check liveness".into(),
            parameters: json!({"type": "object", "properties": {}}),
        };
        let verbose = ToolDefinition {
            name: "search".into(),
            description: "d".repeat(2000),
            parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        };

        assert_eq!(estimate_tool_tokens(&[]), 0);
        let one = estimate_tool_tokens(std::slice::from_ref(&small));
        assert!(one > 0);
        assert!(estimate_tool_tokens(&[small.clone(), verbose.clone()]) > one);
        assert!(estimate_tool_tokens(std::slice::from_ref(&verbose)) > 500);
    }

    #[test]
    fn tool_result_estimated_over_serialized_json() {
        let small = estimate_value_tokens(&json!({"ok": true}));
        let large = estimate_value_tokens(&json!({"data": "x".repeat(400)}));
        assert!(large > small);
    }
}
