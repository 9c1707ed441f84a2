//! OpenAI-compatible backend.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, Together AI, Fireworks
//! AI, and any other endpoint exposing `/chat/completions` streaming.
//! Bearer authentication, `data: [DONE]` stream termination, usage via
//! `stream_options.include_usage`.

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

use crate::error_from_status;
use crate::normalize::{ChatChunk, OpenAiNormalizer};
use crate::sse::{SseLine, SseLineBuffer};

/// An OpenAI-compatible model backend.
pub struct OpenAiBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI backend (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter backend (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an Ollama backend (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert turns to OpenAI chat message format.
    ///
    /// A tool-role turn may carry several result parts; each becomes its
    /// own `tool` message since OpenAI keys results by `tool_call_id`.
    fn to_api_messages(turns: &[Turn]) -> Vec<ApiMessage> {
        let mut result = Vec::new();

        for turn in turns {
            match turn.role {
                Role::Tool => {
                    if let Content::Parts(parts) = &turn.content {
                        for part in parts {
                            if let Part::ToolResult {
                                tool_use_id,
                                output,
                                ..
                            } = part
                            {
                                result.push(ApiMessage {
                                    role: "tool".into(),
                                    content: Some(
                                        serde_json::to_string(output).unwrap_or_default(),
                                    ),
                                    tool_calls: None,
                                    tool_call_id: Some(tool_use_id.clone()),
                                });
                            }
                        }
                    }
                }
                Role::Assistant if turn.has_tool_use() => {
                    let Content::Parts(parts) = &turn.content else {
                        continue;
                    };
                    let text = turn.content.text();
                    let tool_calls: Vec<ApiToolCall> = parts
                        .iter()
                        .filter_map(|p| match p {
                            Part::ToolUse { id, name, input } => Some(ApiToolCall {
                                id: id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: name.clone(),
                                    arguments: serde_json::to_string(input).unwrap_or_default(),
                                },
                            }),
                            _ => None,
                        })
                        .collect();

                    result.push(ApiMessage {
                        role: "assistant".into(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: Some(tool_calls),
                        tool_call_id: None,
                    });
                }
                role => {
                    result.push(ApiMessage {
                        role: match role {
                            Role::User => "user".into(),
                            Role::Assistant => "assistant".into(),
                            Role::System => "system".into(),
                            Role::Tool => unreachable!(),
                        },
                        content: Some(turn.content.text()),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(&self, request: &BackendRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.turns),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        request: BackendRequest,
    ) -> Result<mpsc::Receiver<Result<StreamEvent, BackendError>>, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request);

        debug!(backend = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(error_from_status(status, error_body));
        }

        let (tx, rx) = mpsc::channel(64);
        let backend_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::new();
            let mut normalizer = OpenAiNormalizer::new();

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
                        continue;
                    };

                    if data == "[DONE]" {
                        for event in normalizer.finish() {
                            if tx.send(Ok(event)).await.is_err() {
                                return;
                            }
                        }
                        return;
                    }

                    let chunk: ChatChunk = match serde_json::from_str(&data) {
                        Ok(c) => c,
                        Err(e) => {
                            trace!(
                                backend = %backend_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                            continue;
                        }
                    };

                    for event in normalizer.handle(chunk) {
                        if tx.send(Ok(event)).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            for event in normalizer.finish() {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}
