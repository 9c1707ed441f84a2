//! # Tandem Core
//!
//! Domain types, traits, and error definitions for the Tandem chat
//! orchestration engine. This crate has **zero framework dependencies**
//! — it defines the domain model that all other crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod backend;
pub mod error;
pub mod estimate;
pub mod store;
pub mod stream;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use backend::{BackendRequest, ModelBackend};
pub use error::{BackendError, Error, Result, StoreError, ToolError};
pub use store::ConversationStore;
pub use stream::{AssembledCall, StopReason, StreamEvent, Usage};
pub use tool::{ToolCall, ToolDefinition, ToolDescriptor, ToolExecutor, ToolResult, ToolSource};
pub use turn::{Content, Conversation, ConversationId, Part, Role, Turn};
