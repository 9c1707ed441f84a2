//! In-memory conversation store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use tandem_core::{ConversationId, ConversationStore, StoreError, Turn};

/// Process-local store backed by a `HashMap`. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    conversations: Arc<RwLock<HashMap<ConversationId, Vec<Turn>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations currently held.
    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn append(
        &self,
        conversation_id: &ConversationId,
        turn: &Turn,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.clone())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn list_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}
