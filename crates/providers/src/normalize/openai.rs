//! OpenAI `chat.completion.chunk` stream normalization.
//!
//! OpenAI streams one JSON chunk per `data:` line, with tool-call
//! deltas keyed by index inside `choices[].delta`. There is no per-call
//! completion signal: calls close when a finish reason arrives, or at
//! `[DONE]` if the provider never sent one.

use serde::Deserialize;

use tandem_core::stream::{StopReason, StreamEvent, Usage};

use super::{CallAssembler, completion_event};

/// One parsed `chat.completion.chunk` payload.
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A tool call delta — arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::EndTurn,
        "tool_calls" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        other => StopReason::Other(other.to_string()),
    }
}

/// Translates [`ChatChunk`]s into canonical stream events.
#[derive(Debug, Default)]
pub struct OpenAiNormalizer {
    assembler: CallAssembler,
    /// Indices that already produced a `ToolCallStart`
    started: Vec<usize>,
    stop_reason: Option<StopReason>,
    usage: Option<Usage>,
    finished: bool,
}

impl OpenAiNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one chunk onto zero or more canonical events.
    pub fn handle(&mut self, chunk: ChatChunk) -> Vec<StreamEvent> {
        let mut out = Vec::new();

        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return out;
        };

        if let Some(text) = choice.delta.content
            && !text.is_empty()
        {
            out.push(StreamEvent::TextDelta { text });
        }

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let index = delta.index;
            let name = delta.function.as_ref().and_then(|f| f.name.clone());
            self.assembler.start(index, delta.id.clone(), name.clone());

            if !self.started.contains(&index) {
                self.started.push(index);
                out.push(StreamEvent::ToolCallStart {
                    index,
                    id: delta.id,
                    name,
                });
            }

            if let Some(arguments) = delta.function.and_then(|f| f.arguments)
                && !arguments.is_empty()
            {
                self.assembler.fragment(index, &arguments);
                out.push(StreamEvent::ToolCallArgumentDelta {
                    index,
                    fragment: arguments,
                });
            }
        }

        if let Some(reason) = choice.finish_reason.as_deref() {
            self.stop_reason = Some(map_finish_reason(reason));
            // the finish chunk is the completion signal for every call
            out.extend(
                self.assembler
                    .complete_all()
                    .into_iter()
                    .map(completion_event),
            );
        }

        out
    }

    /// True once a `TurnComplete` has been emitted.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Emit the terminal event. Called on `[DONE]` or when the byte
    /// stream ends without one.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
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

        let stop_reason = self.stop_reason.take().unwrap_or(StopReason::StreamEnd);
        out.push(StreamEvent::TurnComplete {
            stop_reason,
            usage: self.usage.take(),
        });
        out
    }
}
