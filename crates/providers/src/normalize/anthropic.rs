//! Anthropic Messages API stream normalization.
//!
//! Anthropic sends typed SSE events over numbered content blocks. Text
//! and tool-use blocks interleave freely; each `content_block_stop`
//! closes exactly one block, and `message_stop` ends the turn.

use serde::Deserialize;
use tracing::trace;

use tandem_core::stream::{StopReason, StreamEvent, Usage};

use super::{CallAssembler, completion_event};

/// One `data:` payload from an Anthropic Messages stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicEvent {
    MessageStart {
        #[serde(default)]
        message: serde_json::Value,
    },
    ContentBlockStart {
        index: usize,
        content_block: BlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u32>,
    pub output_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" => StopReason::EndTurn,
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        other => StopReason::Other(other.to_string()),
    }
}

/// Translates [`AnthropicEvent`]s into canonical stream events.
#[derive(Debug, Default)]
pub struct AnthropicNormalizer {
    assembler: CallAssembler,
    /// Indices currently streaming tool-use (text blocks close silently)
    open_tool_blocks: Vec<usize>,
    stop_reason: Option<StopReason>,
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    finished: bool,
}

impl AnthropicNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one wire event onto zero or more canonical events.
    pub fn handle(&mut self, event: AnthropicEvent) -> Result<Vec<StreamEvent>, String> {
        let mut out = Vec::new();
        match event {
            AnthropicEvent::MessageStart { message } => {
                if let Some(input) = message
                    .get("usage")
                    .and_then(|u| u.get("input_tokens"))
                    .and_then(|v| v.as_u64())
                {
                    self.prompt_tokens = Some(input as u32);
                }
            }
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                if let BlockStart::ToolUse { id, name } = content_block {
                    self.assembler
                        .start(index, Some(id.clone()), Some(name.clone()));
                    self.open_tool_blocks.push(index);
                    out.push(StreamEvent::ToolCallStart {
                        index,
                        id: Some(id),
                        name: Some(name),
                    });
                }
            }
            AnthropicEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    out.push(StreamEvent::TextDelta { text });
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    self.assembler.fragment(index, &partial_json);
                    out.push(StreamEvent::ToolCallArgumentDelta {
                        index,
                        fragment: partial_json,
                    });
                }
                BlockDelta::Unknown => {}
            },
            AnthropicEvent::ContentBlockStop { index } => {
                if let Some(pos) = self.open_tool_blocks.iter().position(|&i| i == index) {
                    self.open_tool_blocks.swap_remove(pos);
                    if let Some(call) = self.assembler.complete(index) {
                        out.push(completion_event(call));
                    }
                }
            }
            AnthropicEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.as_deref() {
                    self.stop_reason = Some(map_stop_reason(reason));
                }
                if let Some(usage) = usage {
                    if let Some(input) = usage.input_tokens {
                        self.prompt_tokens = Some(input);
                    }
                    self.completion_tokens = Some(usage.output_tokens);
                }
            }
            AnthropicEvent::MessageStop => {
                out.extend(self.finish_with(None));
            }
            AnthropicEvent::Ping => {}
            AnthropicEvent::Error { error } => {
                return Err(error.message);
            }
            AnthropicEvent::Unknown => {
                trace!("Ignoring unrecognized Anthropic event");
            }
        }
        Ok(out)
    }

    /// True once a `TurnComplete` has been emitted.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Flush open calls and emit the terminal event. Called on
    /// `message_stop` or when the byte stream ends without one.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        self.finish_with(Some(StopReason::StreamEnd))
    }

    fn finish_with(&mut self, fallback: Option<StopReason>) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut out: Vec<StreamEvent> = self
            .assembler
            .complete_all()
            .into_iter()
            .map(completion_event)
            .collect();

        let stop_reason = self
            .stop_reason
            .take()
            .or(fallback)
            .unwrap_or(StopReason::EndTurn);

        let usage = self.completion_tokens.map(|completion| {
            let prompt = self.prompt_tokens.unwrap_or(0);
            Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }
        });

        out.push(StreamEvent::TurnComplete { stop_reason, usage });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &str) -> AnthropicEvent {
        serde_json::from_str(data).unwrap()
    }

    fn drive(normalizer: &mut AnthropicNormalizer, data: &str) -> Vec<StreamEvent> {
        normalizer.handle(parse(data)).unwrap()
    }

    #[test]
    fn text_deltas_pass_through() {
        let mut n = AnthropicNormalizer::new();
        let events = drive(
            &mut n,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#,
        );
        assert!(matches!(&events[0], StreamEvent::TextDelta { text } if text == "Hel"));
    }

    #[test]
    fn tool_use_block_lifecycle() {
        let mut n = AnthropicNormalizer::new();

        let start = drive(
            &mut n,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"calculator"}}"#,
        );
        assert!(matches!(
            &start[0],
            StreamEvent::ToolCallStart { index: 1, name: Some(n), .. } if n == "calculator"
        ));

        drive(
            &mut n,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"expression\":"}}"#,
        );
        drive(
            &mut n,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"2+2\"}"}}"#,
        );

        let stop = drive(&mut n, r#"{"type":"content_block_stop","index":1}"#);
        match &stop[0] {
            StreamEvent::ToolCallComplete { index: 1, call } => {
                assert_eq!(call.arguments.as_ref().unwrap()["expression"], "2+2");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn text_block_stop_emits_nothing() {
        let mut n = AnthropicNormalizer::new();
        drive(
            &mut n,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
        );
        let events = drive(&mut n, r#"{"type":"content_block_stop","index":0}"#);
        assert!(events.is_empty());
    }

    #[test]
    fn message_stop_carries_stop_reason_and_usage() {
        let mut n = AnthropicNormalizer::new();
        drive(
            &mut n,
            r#"{"type":"message_start","message":{"usage":{"input_tokens":12}}}"#,
        );
        drive(
            &mut n,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":34}}"#,
        );
        let events = drive(&mut n, r#"{"type":"message_stop"}"#);

        match &events[0] {
            StreamEvent::TurnComplete { stop_reason, usage } => {
                assert_eq!(*stop_reason, StopReason::ToolUse);
                let usage = usage.as_ref().unwrap();
                assert_eq!(usage.prompt_tokens, 12);
                assert_eq!(usage.total_tokens, 46);
            }
            other => panic!("expected TurnComplete, got {other:?}"),
        }
        assert!(n.finished());
    }

    #[test]
    fn stream_cut_force_completes_open_calls() {
        let mut n = AnthropicNormalizer::new();
        drive(
            &mut n,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"search"}}"#,
        );
        drive(
            &mut n,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"q\":\"x\""}}"#,
        );

        let events = n.finish();
        // invalid accumulation surfaces as a completed-but-errored call
        assert!(matches!(
            &events[0],
            StreamEvent::ToolCallComplete { call, .. } if call.error.is_some()
        ));
        assert!(matches!(
            &events[1],
            StreamEvent::TurnComplete { stop_reason: StopReason::StreamEnd, .. }
        ));
    }

    #[test]
    fn finish_is_idempotent() {
        let mut n = AnthropicNormalizer::new();
        drive(&mut n, r#"{"type":"message_stop"}"#);
        assert!(n.finish().is_empty());
    }

    #[test]
    fn error_event_surfaces_message() {
        let mut n = AnthropicNormalizer::new();
        let err = n
            .handle(parse(
                r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            ))
            .unwrap_err();
        assert_eq!(err, "Overloaded");
    }

    #[test]
    fn unknown_events_ignored() {
        let mut n = AnthropicNormalizer::new();
        let events = drive(&mut n, r#"{"type":"message_unknown_future"}"#);
        assert!(events.is_empty());
    }
}
