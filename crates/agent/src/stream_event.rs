//! Caller-facing chat events.
//!
//! `ChatEvent` is the only vocabulary the surrounding transport layer
//! consumes from the loop: `start`, repeated `chunk`s, optional inline
//! `note`s, tool activity markers, and a terminal `end` or `error`.

use serde::{Deserialize, Serialize};

/// Events emitted by [`crate::ChatLoop`] while processing a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Processing has begun.
    Start,

    /// Partial assistant text.
    Chunk { content: String },

    /// An inline advisory, e.g. that older history was trimmed.
    Note { message: String },

    /// A tool is about to run.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// A tool finished running.
    ToolResult {
        id: String,
        name: String,
        success: bool,
    },

    /// The request completed; final text was returned to the caller.
    End {
        conversation_id: String,
        iterations: u32,
        tool_calls_made: usize,
    },

    /// The request failed terminally.
    Error { message: String },
}

impl ChatEvent {
    /// Wire event name, for SSE-style framing.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Chunk { .. } => "chunk",
            Self::Note { .. } => "note",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::End { .. } => "end",
            Self::Error { .. } => "error",
        }
    }
}
