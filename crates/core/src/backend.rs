//! The model backend abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BackendError;
use crate::stream::StreamEvent;
use crate::tool::ToolDefinition;
use crate::turn::Turn;

fn default_temperature() -> f32 {
    0.7
}

/// A provider-neutral model request. Backends translate this into
/// their native wire format, including lifting system turns wherever
/// the provider wants them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    /// Model identifier, passed through verbatim
    pub model: String,

    /// Conversation history, already truncated to budget
    pub turns: Vec<Turn>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tool definitions to advertise; empty disables tool use
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl BackendRequest {
    pub fn new(model: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            model: model.into(),
            turns,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A streaming model backend.
///
/// `send` returns a channel of canonical [`StreamEvent`]s; the backend
/// owns the provider dialect and its normalization. A well-behaved
/// stream ends with exactly one `TurnComplete`, and any error delivered
/// on the channel terminates the stream.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name for logs and configuration lookup.
    fn name(&self) -> &str;

    /// Issue a request and stream back canonical events.
    async fn send(
        &self,
        request: BackendRequest,
    ) -> Result<mpsc::Receiver<Result<StreamEvent, BackendError>>, BackendError>;
}
