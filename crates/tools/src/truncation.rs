//! Result-size governance.
//!
//! Tool results fold back into the conversation and get re-sent on
//! every following model call, so an unbounded result would poison the
//! token budget for the rest of the session. Oversized payloads are
//! summarized at the point of production: enough structure survives
//! for the model to reason about the shape of what it got, plus an
//! explicit signal that content was dropped.

use serde_json::{Value, json};

use tandem_core::estimate::estimate_value_tokens;

/// Elements kept when summarizing an oversized array.
const ARRAY_PREVIEW_LEN: usize = 3;

/// Key/value pairs kept when summarizing an oversized object.
const OBJECT_PREVIEW_PAIRS: usize = 5;

/// Objects at or under this many keys skip the pair summary and fall
/// through to the string cut.
const OBJECT_SUMMARY_THRESHOLD: usize = 10;

const CUT_MARKER: &str = "…[truncated]";

/// Bound `value` to roughly `ceiling` estimated tokens.
///
/// Returns the (possibly summarized) value and whether truncation
/// happened. The result is never dropped entirely.
pub fn bound_value(value: Value, ceiling: usize) -> (Value, bool) {
    if estimate_value_tokens(&value) <= ceiling {
        return (value, false);
    }

    let summarized = match &value {
        Value::Array(items) => json!({
            "truncated": true,
            "original_length": items.len(),
            "preview": items.iter().take(ARRAY_PREVIEW_LEN).cloned().collect::<Vec<_>>(),
        }),
        Value::Object(map) if map.len() > OBJECT_SUMMARY_THRESHOLD => {
            let preview: serde_json::Map<String, Value> = map
                .iter()
                .take(OBJECT_PREVIEW_PAIRS)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let remaining: Vec<&String> = map.keys().skip(OBJECT_PREVIEW_PAIRS).collect();
            json!({
                "truncated": true,
                "original_key_count": map.len(),
                "preview": preview,
                "remaining_keys": remaining,
            })
        }
        _ => cut_to_string(&value, ceiling),
    };

    // A summary built from oversized elements can itself blow the
    // ceiling; the string cut is the backstop
    if estimate_value_tokens(&summarized) > ceiling {
        return (cut_to_string(&summarized, ceiling), true);
    }

    (summarized, true)
}

/// Hard cut: render to text, keep a token-ceiling-sized prefix, append
/// a marker.
fn cut_to_string(value: &Value, ceiling: usize) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    // ~4 chars per token, shaved so the estimator's own margin cannot
    // push the cut back over the ceiling
    let max_chars = (ceiling * 4 * 9 / 10)
        .saturating_sub(CUT_MARKER.len())
        .max(16);
    let cut: String = text.chars().take(max_chars).collect();
    Value::String(format!("{cut}{CUT_MARKER}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_untouched() {
        let value = json!({"answer": 4});
        let (bounded, truncated) = bound_value(value.clone(), 100);
        assert_eq!(bounded, value);
        assert!(!truncated);
    }

    #[test]
    fn oversized_array_keeps_preview_and_length() {
        let items: Vec<Value> = (0..10_000).map(|i| json!({"id": i, "label": "row"})).collect();
        let (bounded, truncated) = bound_value(Value::Array(items), 1000);

        assert!(truncated);
        assert_eq!(bounded["original_length"], 10_000);
        assert_eq!(bounded["preview"].as_array().unwrap().len(), 3);
        assert!(estimate_value_tokens(&bounded) <= 1000);
    }

    #[test]
    fn oversized_object_keeps_first_pairs_and_key_names() {
        let mut map = serde_json::Map::new();
        for i in 0..50 {
            map.insert(format!("key_{i:02}"), json!("v".repeat(200)));
        }
        let (bounded, truncated) = bound_value(Value::Object(map), 500);

        assert!(truncated);
        assert_eq!(bounded["original_key_count"], 50);
        assert_eq!(bounded["preview"].as_object().unwrap().len(), 5);
        assert_eq!(bounded["remaining_keys"].as_array().unwrap().len(), 45);
    }

    #[test]
    fn oversized_string_hard_cut_with_marker() {
        let long = "x".repeat(100_000);
        let (bounded, truncated) = bound_value(Value::String(long), 100);

        assert!(truncated);
        let text = bounded.as_str().unwrap();
        assert!(text.ends_with(CUT_MARKER));
        assert!(estimate_value_tokens(&bounded) <= 150);
    }

    #[test]
    fn small_object_over_ceiling_falls_through_to_cut() {
        // 3 keys but one giant value: no pair summary would help
        let value = json!({"a": 1, "b": 2, "data": "y".repeat(50_000)});
        let (bounded, truncated) = bound_value(value, 100);

        assert!(truncated);
        assert!(bounded.as_str().unwrap().ends_with(CUT_MARKER));
    }

    #[test]
    fn preview_of_huge_elements_still_bounded() {
        // Each preview element alone exceeds the ceiling
        let items: Vec<Value> = (0..100).map(|_| json!("z".repeat(40_000))).collect();
        let (bounded, truncated) = bound_value(Value::Array(items), 200);

        assert!(truncated);
        assert!(estimate_value_tokens(&bounded) <= 300);
    }
}
