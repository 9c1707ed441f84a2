//! Provider-dialect to canonical-event translation.
//!
//! Each backend owns a normalizer that maps its typed wire events onto
//! [`StreamEvent`]s. Both normalizers share the [`CallAssembler`], which
//! reconstructs tool calls from whatever fragment order the provider
//! chooses: fragments are concatenated raw and parsed exactly once, at
//! completion.

mod anthropic;
mod openai;

pub use anthropic::{AnthropicEvent, AnthropicNormalizer};
pub use openai::{ChatChunk, OpenAiNormalizer};

use std::collections::BTreeMap;

use tandem_core::stream::{AssembledCall, StreamEvent};
use tracing::warn;

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    buffer: String,
}

/// Reconstructs streamed tool calls, keyed by positional index.
///
/// A call opens on first sight of its index, whether that is an
/// explicit start signal or a bare fragment. Nothing is parsed until
/// the call completes; an unparseable accumulation produces an
/// [`AssembledCall`] carrying the error instead of arguments.
#[derive(Debug, Default)]
pub struct CallAssembler {
    pending: BTreeMap<usize, PendingCall>,
    completed: usize,
}

impl CallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any call has been seen (open or completed).
    pub fn saw_calls(&self) -> bool {
        self.completed > 0 || !self.pending.is_empty()
    }

    /// Open a call at `index`, recording id/name when the provider sends
    /// them up front.
    pub fn start(&mut self, index: usize, id: Option<String>, name: Option<String>) {
        let call = self.pending.entry(index).or_default();
        if let Some(id) = id {
            call.id = Some(id);
        }
        if let Some(name) = name {
            call.name = Some(name);
        }
    }

    /// Append a raw JSON fragment to the call at `index`, opening it if
    /// this is the first sign of its existence.
    pub fn fragment(&mut self, index: usize, fragment: &str) {
        self.pending.entry(index).or_default().buffer.push_str(fragment);
    }

    /// Close the call at `index` and parse its accumulated arguments.
    pub fn complete(&mut self, index: usize) -> Option<AssembledCall> {
        let call = self.pending.remove(&index)?;
        self.completed += 1;
        Some(Self::assemble(index, call))
    }

    /// Close every still-open call, in index order. Used at stream end,
    /// when the provider never sent explicit completion signals (or the
    /// stream was cut before they arrived).
    pub fn complete_all(&mut self) -> Vec<AssembledCall> {
        let pending = std::mem::take(&mut self.pending);
        self.completed += pending.len();
        pending
            .into_iter()
            .map(|(index, call)| Self::assemble(index, call))
            .collect()
    }

    fn assemble(index: usize, call: PendingCall) -> AssembledCall {
        // Some providers stream zero fragments for a no-argument call
        let (arguments, error) = if call.buffer.is_empty() {
            (Some(serde_json::json!({})), None)
        } else {
            match serde_json::from_str::<serde_json::Value>(&call.buffer) {
                Ok(value) => (Some(value), None),
                Err(e) => {
                    warn!(
                        index,
                        name = call.name.as_deref().unwrap_or("?"),
                        error = %e,
                        "Tool call arguments failed to parse"
                    );
                    (None, Some(format!("arguments are not valid JSON: {e}")))
                }
            }
        };

        AssembledCall {
            index,
            id: call.id,
            name: call.name,
            arguments,
            error,
        }
    }
}

/// Convenience: wrap an assembled call into its completion event.
pub(crate) fn completion_event(call: AssembledCall) -> StreamEvent {
    StreamEvent::ToolCallComplete {
        index: call.index,
        call,
    }
}
