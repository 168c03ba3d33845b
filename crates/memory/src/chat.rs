//! Per-session view over a [`ChatMemoryStore`].

use std::sync::Arc;

use recall_common::{ChatTurn, Result};
use tracing::debug;

use crate::store::ChatMemoryStore;

/// One session's chat history.
///
/// The in-process sequence is the source of truth between loads. Every
/// append writes the full history back (full replace), so the store's
/// policy is always applied to the complete set rather than a delta.
pub struct WorkingMemoryChat {
    session_id: String,
    store: Arc<dyn ChatMemoryStore>,
    turns: Vec<ChatTurn>,
}

impl WorkingMemoryChat {
    /// Load the session, treating an unreachable store as an empty history.
    pub async fn load(session_id: impl Into<String>, store: Arc<dyn ChatMemoryStore>) -> Self {
        let session_id = session_id.into();
        let turns = store.get_or_empty(&session_id).await;
        debug!(session_id = %session_id, count = turns.len(), "Initialized working memory chat");
        Self {
            session_id,
            store,
            turns,
        }
    }

    /// Load the session, failing if the store cannot be read.
    pub async fn load_strict(
        session_id: impl Into<String>,
        store: Arc<dyn ChatMemoryStore>,
    ) -> Result<Self> {
        let session_id = session_id.into();
        let turns = store.get(&session_id).await?;
        debug!(session_id = %session_id, count = turns.len(), "Initialized working memory chat");
        Ok(Self {
            session_id,
            store,
            turns,
        })
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn read(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Append a turn and mirror the whole history to the store.
    ///
    /// Returns whether the write reached the store. A failed write keeps the
    /// turn in-process; the conversation continues without it persisting.
    pub async fn append(&mut self, turn: ChatTurn) -> bool {
        self.turns.push(turn);
        self.store.put(&self.session_id, &self.turns).await.is_ok()
    }

    /// Forget the session locally and remotely. Returns whether the remote
    /// delete succeeded.
    pub async fn clear(&mut self) -> bool {
        self.turns.clear();
        self.store.delete(&self.session_id).await.is_ok()
    }
}
