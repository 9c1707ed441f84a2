//! Turn and Conversation domain types.
//!
//! A conversation is an append-only, totally ordered sequence of turns.
//! Turns are immutable once appended; truncation builds new views over
//! them rather than editing history in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// One block inside a multi-part turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    /// Opaque reference to image data; the engine never inspects it.
    Image {
        source: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        output: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
}

/// Turn content: plain text for the common case, structured parts when
/// a turn carries images, tool invocations, or tool results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<Part>),
}

impl Content {
    /// The concatenated text of this content, ignoring non-text parts.
    pub fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who authored this turn
    pub role: Role,

    /// The turn content
    pub content: Content,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (provenance, truncation markers, provider info)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Turn {
    fn new(role: Role, content: Content) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// Create a new system turn.
    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(Role::System, content.into())
    }

    /// Create an assistant turn carrying tool invocations, with optional
    /// interim text ahead of the calls.
    pub fn assistant_with_calls(text: Option<String>, calls: Vec<crate::tool::ToolCall>) -> Self {
        let mut parts = Vec::new();
        if let Some(text) = text
            && !text.is_empty()
        {
            parts.push(Part::Text { text });
        }
        for call in calls {
            parts.push(Part::ToolUse {
                id: call.id,
                name: call.name,
                input: call.arguments,
            });
        }
        Self::new(Role::Assistant, Content::Parts(parts))
    }

    /// Create a tool-result turn responding to a single tool invocation.
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        output: serde_json::Value,
        is_error: bool,
    ) -> Self {
        Self::new(
            Role::Tool,
            Content::Parts(vec![Part::ToolResult {
                tool_use_id: tool_use_id.into(),
                output,
                is_error,
            }]),
        )
    }

    /// Record that this turn was shrunk to fit a budget.
    pub fn mark_truncated(&mut self) {
        self.metadata
            .insert("truncated".to_string(), serde_json::Value::Bool(true));
    }

    /// Whether any part of this turn is a tool invocation.
    pub fn has_tool_use(&self) -> bool {
        matches!(&self.content, Content::Parts(parts)
            if parts.iter().any(|p| matches!(p, Part::ToolUse { .. })))
    }
}

/// An ordered sequence of turns with shared context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered turns
    pub turns: Vec<Turn>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was appended
    pub updated_at: DateTime<Utc>,

    /// Conversation-level metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::Map::new(),
        }
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn);
    }

    /// The most recent user turn, if any.
    pub fn last_user_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::User)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_turn() {
        let turn = Turn::user("Hello!");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content.text(), "Hello!");
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Turn::user("First turn"));
        assert_eq!(conv.turns.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::assistant_with_calls(
            Some("Let me check.".into()),
            vec![crate::tool::ToolCall {
                id: "call_1".into(),
                name: "calculator".into(),
                arguments: serde_json::json!({"expression": "2+2"}),
            }],
        );
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert!(back.has_tool_use());
        assert_eq!(back.content.text(), "Let me check.");
    }

    #[test]
    fn last_user_turn_skips_later_roles() {
        let mut conv = Conversation::new();
        conv.push(Turn::user("question"));
        conv.push(Turn::assistant("answer"));
        conv.push(Turn::tool_result("call_1", serde_json::json!({"ok": true}), false));

        let last = conv.last_user_turn().unwrap();
        assert_eq!(last.content.text(), "question");
    }

    #[test]
    fn plain_text_content_serializes_as_string() {
        let turn = Turn::user("hi");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["content"], serde_json::json!("hi"));
    }
}
