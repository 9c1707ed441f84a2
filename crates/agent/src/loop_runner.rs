//! The agentic chat loop.
//!
//! Drives the model-call / tool-call cycle for one request: truncate
//! history to the model's context window, stream the model's turn,
//! execute any tool calls, feed the results back, and repeat until the
//! model answers in plain text or the iteration budget runs out.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use tandem_config::ChatConfig;
use tandem_core::estimate::estimate_tool_tokens;
use tandem_core::{
    BackendError, BackendRequest, Content, Conversation, ConversationId, ConversationStore, Error,
    ModelBackend, Part, Role, StreamEvent, ToolCall, Turn,
};
use tandem_tools::ToolRegistry;

use crate::context::{TruncateOptions, truncate};
use crate::retry::RetryPolicy;
use crate::stream_event::ChatEvent;

/// Returned when even the forced tool-free final call produces nothing.
const FALLBACK_MESSAGE: &str = "I've reached the maximum number of tool steps without completing \
     this request. Please provide further guidance.";

/// The loop controller. One instance serves many conversations; each
/// `process` call owns its own iteration state.
pub struct ChatLoop {
    backend: Arc<dyn ModelBackend>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_iterations: u32,
    context_limit: usize,
    stream_idle_timeout: Duration,
    truncate_options: TruncateOptions,
    tools_enabled: bool,
    retry: RetryPolicy,
}

/// One streamed model turn, fully consumed.
struct TurnOutcome {
    text: String,
    calls: Vec<tandem_core::AssembledCall>,
}

/// A stream that died, with whatever text arrived before it did.
struct StreamFailure {
    partial_text: String,
    error: BackendError,
}

struct RunOutcome {
    text: String,
    iterations: u32,
    tool_calls_made: usize,
}

impl ChatLoop {
    /// Build a loop from configuration, using the configured default
    /// model and its context limit.
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            store,
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            max_iterations: config.limits.max_iterations,
            context_limit: config.context_limit_for(&config.default_model),
            stream_idle_timeout: config.limits.stream_idle_timeout(),
            truncate_options: TruncateOptions::from_config(config),
            tools_enabled: true,
            retry: RetryPolicy::default(),
        }
    }

    /// Target a different model with its own context limit.
    pub fn with_model(mut self, model: impl Into<String>, context_limit: usize) -> Self {
        self.model = model.into();
        self.context_limit = context_limit;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Disable tool use for requests through this loop.
    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stream_idle_timeout(mut self, idle: Duration) -> Self {
        self.stream_idle_timeout = idle;
        self
    }

    /// Process a conversation whose latest turn is the user's request.
    ///
    /// Emits [`ChatEvent`]s on `events` as the answer streams, appends
    /// every generated turn to `conversation` and the store, and
    /// returns the final assistant text.
    pub async fn process(
        &self,
        conversation: &mut Conversation,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<String, Error> {
        self.process_with_context(conversation, None, events).await
    }

    /// Like [`process`](Self::process), folding pre-fetched context into
    /// the latest user turn before the first model call.
    pub async fn process_with_context(
        &self,
        conversation: &mut Conversation,
        additional_context: Option<&str>,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<String, Error> {
        let _ = events.send(ChatEvent::Start).await;
        info!(
            conversation_id = %conversation.id,
            turns = conversation.turns.len(),
            model = %self.model,
            "Processing conversation"
        );

        if let Some(context) = additional_context {
            fold_context(conversation, context);
        }

        match self.run(conversation, events).await {
            Ok(run) => {
                let _ = events
                    .send(ChatEvent::End {
                        conversation_id: conversation.id.to_string(),
                        iterations: run.iterations,
                        tool_calls_made: run.tool_calls_made,
                    })
                    .await;
                Ok(run.text)
            }
            Err(e) => {
                let _ = events
                    .send(ChatEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        conversation: &mut Conversation,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<RunOutcome, Error> {
        let definitions = if self.tools_enabled {
            match self.registry.definitions().await {
                Ok(defs) => defs,
                Err(e) => {
                    warn!(error = %e, "Tool discovery failed, continuing without tools");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut iteration = 0u32;
        let mut tool_calls_made = 0usize;
        let mut extra_safety = 0usize;
        let mut overflow_retries = 0u32;

        loop {
            iteration += 1;
            let force_final = iteration > self.max_iterations;
            if force_final {
                warn!(
                    conversation_id = %conversation.id,
                    iterations = iteration,
                    "Iteration budget exhausted, forcing a tool-free final call"
                );
            }
            let advertise_tools = self.tools_enabled && !force_final && !definitions.is_empty();

            let mut options = self.truncate_options.clone();
            options.safety_buffer_tokens += extra_safety;
            options.reserve_for_tool_definitions = if advertise_tools {
                // Large tool schemas eat real context; reserve whichever
                // is bigger, the configured floor or the measured size.
                options
                    .reserve_for_tool_definitions
                    .max(estimate_tool_tokens(&definitions))
            } else {
                0
            };

            let (turns, report) = truncate(&conversation.turns, self.context_limit, &options);
            if report.removed_turn_count > 0 {
                let _ = events
                    .send(ChatEvent::Note {
                        message: format!(
                            "history trimmed, {} older turns removed",
                            report.removed_turn_count
                        ),
                    })
                    .await;
            }
            if report.still_over_budget {
                warn!(
                    estimate = report.final_token_estimate,
                    limit = self.context_limit,
                    "History exceeds budget even after truncation, sending anyway"
                );
            }

            let mut request =
                BackendRequest::new(&self.model, turns).with_temperature(self.temperature);
            if let Some(max) = self.max_tokens {
                request = request.with_max_tokens(max);
            }
            if advertise_tools {
                request = request.with_tools(definitions.clone());
            }

            debug!(
                conversation_id = %conversation.id,
                iteration,
                tools = request.tools.len(),
                "Model call"
            );

            let outcome = match self.stream_one_turn(request, events).await {
                Ok(outcome) => outcome,
                Err(failure) => {
                    if matches!(failure.error, BackendError::ContextLengthExceeded(_))
                        && overflow_retries < 2
                    {
                        overflow_retries += 1;
                        extra_safety = extra_safety * 2 + self.context_limit / 8;
                        iteration -= 1;
                        let _ = events
                            .send(ChatEvent::Note {
                                message: "context window exceeded, retrying with tighter history"
                                    .to_string(),
                            })
                            .await;
                        continue;
                    }
                    if !failure.partial_text.is_empty() {
                        warn!(
                            error = %failure.error,
                            "Stream failed mid-answer, keeping partial text"
                        );
                        let turn = Turn::assistant(failure.partial_text.clone());
                        self.persist(&conversation.id, &turn).await;
                        conversation.push(turn);
                        return Ok(RunOutcome {
                            text: failure.partial_text,
                            iterations: iteration,
                            tool_calls_made,
                        });
                    }
                    return Err(Error::Backend(failure.error));
                }
            };

            let mut valid: Vec<ToolCall> = Vec::new();
            let mut invalid: Vec<String> = Vec::new();
            for call in &outcome.calls {
                match call.validate() {
                    Ok(tool_call) => valid.push(tool_call),
                    Err(reason) => invalid.push(reason),
                }
            }

            // Final-answer path: no calls at all, tools off, or the
            // forced final call (whose calls, if any, are ignored).
            if force_final || !advertise_tools || (valid.is_empty() && invalid.is_empty()) {
                let text = if outcome.text.is_empty() && force_final {
                    FALLBACK_MESSAGE.to_string()
                } else {
                    outcome.text
                };
                let turn = Turn::assistant(text.clone());
                self.persist(&conversation.id, &turn).await;
                conversation.push(turn);
                return Ok(RunOutcome {
                    text,
                    iterations: iteration,
                    tool_calls_made,
                });
            }

            // Persist interim text together with the accepted calls so
            // an explanation preceding a tool call is not lost.
            let interim = (!outcome.text.is_empty()).then(|| outcome.text.clone());
            if interim.is_some() || !valid.is_empty() {
                let assistant_turn = Turn::assistant_with_calls(interim, valid.clone());
                self.persist(&conversation.id, &assistant_turn).await;
                conversation.push(assistant_turn);
            }

            if !invalid.is_empty() {
                warn!(count = invalid.len(), "Excluding invalid tool calls");
                let explanatory = Turn::user(format!(
                    "Some tool calls could not be executed: {}. Adjust the calls and retry, \
                     or answer without those tools.",
                    invalid.join("; ")
                ));
                self.persist(&conversation.id, &explanatory).await;
                conversation.push(explanatory);
            }

            if valid.is_empty() {
                // Whole batch invalid. The explanatory turn above tells
                // the model what went wrong before the next call.
                continue;
            }

            for call in &valid {
                let _ = events
                    .send(ChatEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    })
                    .await;
            }

            debug!(tool_count = valid.len(), "Executing tool calls");
            let results = join_all(valid.iter().map(|call| self.registry.execute(call))).await;
            tool_calls_made += valid.len();

            // Results append in declaration order; downstream model
            // calls are order-sensitive.
            for result in results {
                let _ = events
                    .send(ChatEvent::ToolResult {
                        id: result.call_id.clone(),
                        name: result.name.clone(),
                        success: result.success,
                    })
                    .await;
                let turn =
                    Turn::tool_result(result.call_id.clone(), result.payload, !result.success);
                self.persist(&conversation.id, &turn).await;
                conversation.push(turn);
            }
        }
    }

    /// Stream one model turn to completion, forwarding text deltas.
    async fn stream_one_turn(
        &self,
        request: BackendRequest,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<TurnOutcome, StreamFailure> {
        let mut rx = self
            .retry
            .run(|| self.backend.send(request.clone()), BackendError::is_retryable)
            .await
            .map_err(|error| StreamFailure {
                partial_text: String::new(),
                error,
            })?;

        let mut text = String::new();
        let mut calls = Vec::new();

        loop {
            match timeout(self.stream_idle_timeout, rx.recv()).await {
                Err(_) => {
                    return Err(StreamFailure {
                        partial_text: text,
                        error: BackendError::Timeout(self.stream_idle_timeout.as_secs()),
                    });
                }
                Ok(None) => {
                    return Err(StreamFailure {
                        partial_text: text,
                        error: BackendError::StreamInterrupted(
                            "stream ended without turn completion".to_string(),
                        ),
                    });
                }
                Ok(Some(Err(error))) => {
                    return Err(StreamFailure {
                        partial_text: text,
                        error,
                    });
                }
                Ok(Some(Ok(event))) => match event {
                    StreamEvent::TextDelta { text: delta } => {
                        text.push_str(&delta);
                        let _ = events.send(ChatEvent::Chunk { content: delta }).await;
                    }
                    StreamEvent::ToolCallStart { .. }
                    | StreamEvent::ToolCallArgumentDelta { .. } => {}
                    StreamEvent::ToolCallComplete { call, .. } => calls.push(call),
                    StreamEvent::TurnComplete { .. } => {
                        return Ok(TurnOutcome { text, calls });
                    }
                },
            }
        }
    }

    async fn persist(&self, conversation_id: &ConversationId, turn: &Turn) {
        if let Err(e) = self.store.append(conversation_id, turn).await {
            warn!(error = %e, conversation_id = %conversation_id, "Failed to persist turn");
        }
    }
}

/// Append pre-fetched context to the latest user turn. The content is
/// opaque to the loop.
fn fold_context(conversation: &mut Conversation, context: &str) {
    let Some(turn) = conversation
        .turns
        .iter_mut()
        .rev()
        .find(|t| t.role == Role::User)
    else {
        return;
    };
    match &mut turn.content {
        Content::Text(text) => {
            text.push_str("\n\nRelevant context:\n");
            text.push_str(context);
        }
        Content::Parts(parts) => parts.push(Part::Text {
            text: format!("Relevant context:\n{context}"),
        }),
    }
}
