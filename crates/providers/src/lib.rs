//! # Tandem Providers
//!
//! Model backend implementations. Each backend speaks one provider
//! dialect over HTTP/SSE and exposes the canonical event stream defined
//! in `tandem-core`.
//!
//! - [`AnthropicBackend`] — Anthropic's native Messages API
//! - [`OpenAiBackend`] — OpenAI and the ecosystem of compatible
//!   endpoints (OpenRouter, Ollama, vLLM, ...)
//!
//! The [`normalize`] module holds the per-provider wire-event adapters;
//! they are pure state machines, testable without any HTTP.

pub mod anthropic;
pub mod normalize;
pub mod openai;
pub mod router;
pub mod sse;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;
pub use router::build_backend;

use tandem_core::error::BackendError;

/// Phrases providers use to report an over-long prompt. Checked against
/// error bodies so the loop can react by truncating harder.
const CONTEXT_LENGTH_MARKERS: &[&str] = &[
    "context_length_exceeded",
    "maximum context length",
    "prompt is too long",
    "input length and `max_tokens` exceed",
];

/// Map a non-200 response to a [`BackendError`].
pub(crate) fn error_from_status(status: u16, body: String) -> BackendError {
    if status == 429 {
        return BackendError::RateLimited {
            retry_after_secs: 5,
        };
    }
    if status == 401 || status == 403 {
        return BackendError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        );
    }
    if looks_like_context_overflow(&body) {
        return BackendError::ContextLengthExceeded(body);
    }
    if status == 404 {
        return BackendError::ModelNotFound(body);
    }
    BackendError::ApiError {
        status_code: status,
        message: body,
    }
}

pub(crate) fn looks_like_context_overflow(message: &str) -> bool {
    let lower = message.to_lowercase();
    CONTEXT_LENGTH_MARKERS.iter().any(|m| lower.contains(m))
}
