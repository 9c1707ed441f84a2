//! The canonical streaming vocabulary.
//!
//! Every model backend translates its provider-native wire events into
//! this small event set, so the loop controller never sees provider
//! dialects. Tool-call arguments arrive as raw JSON fragments keyed by a
//! positional index and are parsed only once a call is complete.

use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Why a model turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the assistant's answer
    EndTurn,
    /// The model wants tool results before continuing
    ToolUse,
    /// Output budget exhausted
    MaxTokens,
    /// The stream ended without an explicit stop signal
    StreamEnd,
    /// Provider-specific reason, passed through verbatim
    Other(String),
}

/// Token accounting reported by the provider, when available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A tool call reconstructed from streamed fragments.
///
/// `arguments` is `Some` only when every fragment arrived and the
/// concatenation parsed as JSON. A parse failure leaves `arguments`
/// empty and records the error; it is never silently replaced with an
/// empty object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledCall {
    /// Positional index within the turn
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl AssembledCall {
    /// Promote to an executable [`ToolCall`], or explain why this call
    /// cannot run.
    pub fn validate(&self) -> Result<ToolCall, String> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let id = self
            .id
            .clone()
            .ok_or_else(|| format!("tool call at index {} has no id", self.index))?;
        let name = self
            .name
            .clone()
            .ok_or_else(|| format!("tool call at index {} has no name", self.index))?;
        match &self.arguments {
            Some(args) if args.is_object() => Ok(ToolCall {
                id,
                name,
                arguments: args.clone(),
            }),
            Some(other) => Err(format!(
                "tool call '{name}' arguments are {} rather than an object",
                json_type_name(other)
            )),
            None => Err(format!("tool call '{name}' arguments never completed")),
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// A canonical event emitted by a [`crate::backend::ModelBackend`] stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text
    TextDelta { text: String },

    /// A tool call opened at `index`; id/name may be filled in later
    /// by fragment events depending on the provider
    ToolCallStart {
        index: usize,
        id: Option<String>,
        name: Option<String>,
    },

    /// Raw JSON fragment for the call at `index`
    ToolCallArgumentDelta { index: usize, fragment: String },

    /// The call at `index` finished streaming and was assembled
    ToolCallComplete { index: usize, call: AssembledCall },

    /// Exactly one per stream, always last
    TurnComplete {
        stop_reason: StopReason,
        usage: Option<Usage>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(arguments: Option<serde_json::Value>, error: Option<String>) -> AssembledCall {
        AssembledCall {
            index: 0,
            id: Some("call_1".into()),
            name: Some("calculator".into()),
            arguments,
            error,
        }
    }

    #[test]
    fn valid_call_promotes() {
        let assembled = call(Some(json!({"expression": "2+2"})), None);
        let tool_call = assembled.validate().unwrap();
        assert_eq!(tool_call.name, "calculator");
        assert_eq!(tool_call.arguments["expression"], "2+2");
    }

    #[test]
    fn empty_object_is_valid() {
        assert!(call(Some(json!({})), None).validate().is_ok());
    }

    #[test]
    fn missing_arguments_rejected() {
        let err = call(None, None).validate().unwrap_err();
        assert!(err.contains("never completed"));
    }

    #[test]
    fn non_object_arguments_rejected() {
        let err = call(Some(json!([1, 2])), None).validate().unwrap_err();
        assert!(err.contains("an array"));
    }

    #[test]
    fn recorded_error_wins() {
        let assembled = call(Some(json!({})), Some("unbalanced braces".into()));
        assert_eq!(assembled.validate().unwrap_err(), "unbalanced braces");
    }

    #[test]
    fn missing_name_rejected() {
        let assembled = AssembledCall {
            index: 2,
            id: Some("call_3".into()),
            name: None,
            arguments: Some(json!({})),
            error: None,
        };
        assert!(assembled.validate().unwrap_err().contains("no name"));
    }
}
