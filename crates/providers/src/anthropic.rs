//! Anthropic native backend.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible
//! proxy):
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System turns lifted into the top-level `system` field
//! - Native tool use via `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with typed `content_block_*` events

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use tandem_core::backend::{BackendRequest, ModelBackend};
use tandem_core::error::BackendError;
use tandem_core::stream::StreamEvent;
use tandem_core::tool::ToolDefinition;
use tandem_core::turn::{Content, Part, Role, Turn};

use crate::normalize::{AnthropicEvent, AnthropicNormalizer};
use crate::sse::{SseLine, SseLineBuffer};
use crate::{error_from_status, looks_like_context_overflow};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API backend.
pub struct AnthropicBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    /// Create a new Anthropic backend.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Extract system turns from the history. Anthropic takes the system
    /// prompt as a top-level field, not as messages.
    fn extract_system(turns: &[Turn]) -> (Option<String>, Vec<&Turn>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut non_system: Vec<&Turn> = Vec::new();

        for turn in turns {
            match turn.role {
                Role::System => system_parts.push(turn.content.text()),
                _ => non_system.push(turn),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert turns to Anthropic message format with content blocks.
    fn to_api_messages(turns: &[&Turn]) -> Vec<ApiMessage> {
        let mut result = Vec::new();

        for turn in turns {
            let role = match turn.role {
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
                Role::System => continue, // lifted separately
            };

            let content = match &turn.content {
                Content::Text(text) => ApiContent::Text(text.clone()),
                Content::Parts(parts) => {
                    ApiContent::Blocks(parts.iter().map(part_to_block).collect())
                }
            };

            result.push(ApiMessage {
                role: role.into(),
                content,
            });
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
        tools
            .iter()
            .map(|t| ApiTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn build_body(&self, request: &BackendRequest) -> serde_json::Value {
        let (system, turns) = Self::extract_system(&request.turns);
        let api_messages = Self::to_api_messages(&turns);
        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": api_messages,
            "max_tokens": max_tokens,
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

fn part_to_block(part: &Part) -> ApiBlock {
    match part {
        Part::Text { text } => ApiBlock::Text { text: text.clone() },
        Part::Image { source } => ApiBlock::Image {
            source: serde_json::json!({ "type": "url", "url": source }),
        },
        Part::ToolUse { id, name, input } => ApiBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        Part::ToolResult {
            tool_use_id,
            output,
            is_error,
        } => ApiBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: serde_json::to_string(output).unwrap_or_default(),
            is_error: *is_error,
        },
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        request: BackendRequest,
    ) -> Result<mpsc::Receiver<Result<StreamEvent, BackendError>>, BackendError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request);

        debug!(backend = "anthropic", model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(error_from_status(status, error_body));
        }

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::new();
            let mut normalizer = AnthropicNormalizer::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(BackendError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    let SseLine::Data(data) = line else {
                        // typed `event:` lines duplicate the payload's
                        // "type" field
                        continue;
                    };
                    if data.is_empty() {
                        continue;
                    }

                    let event: AnthropicEvent = match serde_json::from_str(&data) {
                        Ok(e) => e,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    match normalizer.handle(event) {
                        Ok(events) => {
                            for event in events {
                                if tx.send(Ok(event)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        Err(message) => {
                            let err = if looks_like_context_overflow(&message) {
                                BackendError::ContextLengthExceeded(message)
                            } else {
                                BackendError::ApiError {
                                    status_code: 200,
                                    message,
                                }
                            };
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                    }

                    if normalizer.finished() {
                        return;
                    }
                }
            }

            // Byte stream ended without message_stop
            for event in normalizer.finish() {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    Image {
        source: serde_json::Value,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::tool::ToolCall;

    #[test]
    fn constructor() {
        let backend = AnthropicBackend::new("sk-ant-test");
        assert_eq!(backend.name(), "anthropic");
        assert_eq!(backend.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let backend = AnthropicBackend::new("sk-ant-test").with_base_url("https://proxy.local/");
        assert_eq!(backend.base_url, "https://proxy.local");
    }

    #[test]
    fn system_extraction() {
        let turns = vec![
            Turn::system("You are helpful"),
            Turn::system("Be concise"),
            Turn::user("Hello"),
            Turn::assistant("Hi!"),
        ];

        let (system, non_system) = AnthropicBackend::extract_system(&turns);
        assert_eq!(system.as_deref(), Some("You are helpful\n\nBe concise"));
        assert_eq!(non_system.len(), 2);
    }

    #[test]
    fn tool_turns_become_user_messages() {
        let turn = Turn::tool_result("toolu_1", serde_json::json!({"answer": 4}), false);
        let refs = vec![&turn];
        let messages = AnthropicBackend::to_api_messages(&refs);
        assert_eq!(messages[0].role, "user");

        let json = serde_json::to_value(&messages[0]).unwrap();
        assert_eq!(json["content"][0]["type"], "tool_result");
        assert_eq!(json["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn assistant_tool_use_serializes_as_blocks() {
        let turn = Turn::assistant_with_calls(
            Some("Checking.".into()),
            vec![ToolCall {
                id: "toolu_1".into(),
                name: "calculator".into(),
                arguments: serde_json::json!({"expression": "2+2"}),
            }],
        );
        let refs = vec![&turn];
        let messages = AnthropicBackend::to_api_messages(&refs);
        let json = serde_json::to_value(&messages[0]).unwrap();

        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "tool_use");
        assert_eq!(json["content"][1]["name"], "calculator");
    }

    #[test]
    fn body_lifts_system_and_tools() {
        let backend = AnthropicBackend::new("sk-test");
        let request = BackendRequest::new(
            "claude-sonnet-4",
            vec![Turn::system("Be brief"), Turn::user("Hi")],
        )
        .with_tools(vec![ToolDefinition {
            name: "calculator".into(),
            description: "Evaluate math".into(),
            parameters: serde_json::json!({"type": "object"}),
        }]);

        let body = backend.build_body(&request);
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["name"], "calculator");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn plain_text_message_stays_plain() {
        let turn = Turn::user("Hello");
        let refs = vec![&turn];
        let messages = AnthropicBackend::to_api_messages(&refs);
        let json = serde_json::to_value(&messages[0]).unwrap();
        assert_eq!(json["content"], "Hello");
    }
}
