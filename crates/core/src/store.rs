//! The conversation store seam.
//!
//! Persistence is a collaborator, not a concern of the engine: the loop
//! appends every turn it produces through this trait and otherwise
//! works on the in-memory [`crate::turn::Conversation`]. Implementations
//! live in `tandem-store`.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::turn::{ConversationId, Turn};

/// Append-only record of conversation turns.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one turn to a conversation's record.
    async fn append(&self, conversation_id: &ConversationId, turn: &Turn)
    -> Result<(), StoreError>;

    /// All recorded turns for a conversation, in insertion order.
    async fn list_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>, StoreError>;
}
