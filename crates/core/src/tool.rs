//! Tool invocation types and the executor/source traits.
//!
//! The registry itself lives in `tandem-tools`; this module defines the
//! value objects that cross crate boundaries and the two seams a tool
//! implementation plugs into: [`ToolExecutor`] (how a tool runs) and
//! [`ToolSource`] (where descriptors come from during a registry load).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ToolError;

/// A validated tool invocation ready for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned ID, echoed back in the result
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

/// The outcome of a tool execution.
///
/// Failures are data, not errors: a failed execution produces a result
/// with `success: false` and an explanatory payload, which flows back
/// into the conversation like any other result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the call this responds to
    pub call_id: String,

    /// Name of the tool that ran
    pub name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Result payload (or `{"error": ...}` on failure), bounded in size
    pub payload: serde_json::Value,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            success: true,
            payload,
        }
    }

    pub fn failure(
        call_id: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            success: false,
            payload: serde_json::json!({ "error": message.into() }),
        }
    }
}

/// A tool definition as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON-Schema-shaped parameter description
    pub parameters: serde_json::Value,
}

/// Executes one tool. Implementations must be cheap to clone behind an
/// `Arc` and safe to call concurrently.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool with already-validated JSON-object arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// A registered tool: its advertised definition plus its executor.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub executor: Arc<dyn ToolExecutor>,
}

impl ToolDescriptor {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Supplies tool descriptors to the registry on each (re)load.
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// A label for logs.
    fn name(&self) -> &str;

    /// Enumerate the tools this source currently provides.
    async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolError>;
}
