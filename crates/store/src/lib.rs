//! Conversation persistence backends.
//!
//! Two implementations of [`ConversationStore`](tandem_core::ConversationStore):
//!
//! - [`InMemoryStore`] keeps turns in a process-local map. Used by tests and
//!   ephemeral sessions.
//! - [`JsonlStore`] appends one JSON line per turn to a file per conversation,
//!   so history survives restarts and individual corrupt lines can be skipped
//!   on load without losing the rest of the file.

mod in_memory;
mod jsonl;

pub use in_memory::InMemoryStore;
pub use jsonl::JsonlStore;
