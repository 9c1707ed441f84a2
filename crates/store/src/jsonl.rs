//! JSONL file-backed conversation store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use tandem_core::{ConversationId, ConversationStore, StoreError, Turn};

/// Durable store that appends one JSON line per turn to a file per
/// conversation under a root directory.
///
/// Appends are a single `write_all` of a serialized line, so a crash can
/// lose at most the line being written. Corrupt lines are skipped on load
/// rather than failing the whole conversation.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    root: PathBuf,
}

impl JsonlStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, conversation_id: &ConversationId) -> PathBuf {
        // Conversation ids are caller-supplied strings, so strip anything
        // that could escape the root directory.
        let safe: String = conversation_id
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.jsonl"))
    }

    async fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::Storage(format!("creating {}: {e}", self.root.display())))
    }
}

#[async_trait]
impl ConversationStore for JsonlStore {
    async fn append(
        &self,
        conversation_id: &ConversationId,
        turn: &Turn,
    ) -> Result<(), StoreError> {
        self.ensure_root().await?;
        let path = self.path_for(conversation_id);

        let mut line = serde_json::to_string(turn)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Storage(format!("opening {}: {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::Storage(format!("writing {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Storage(format!("flushing {}: {e}", path.display())))?;

        debug!(conversation = %conversation_id, path = %path.display(), "Appended turn");
        Ok(())
    }

    async fn list_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>, StoreError> {
        let path = self.path_for(conversation_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&path)
            .await
            .map_err(|e| StoreError::Storage(format!("reading {}: {e}", path.display())))?;

        Ok(load_lines(&contents, &path))
    }
}

fn load_lines(contents: &str, path: &Path) -> Vec<Turn> {
    let mut turns = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Turn>(line) {
            Ok(turn) => turns.push(turn),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Skipping corrupted turn line");
            }
        }
    }
    turns
}
