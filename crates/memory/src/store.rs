//! The working memory store seam and its in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recall_common::{ChatTurn, Result};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::policy::MemoryPolicy;

/// Persists a session's recent turns under a [`MemoryPolicy`].
///
/// Role filters apply identically on `get` and `put`: a role the policy
/// excludes is never written and never returned.
#[async_trait]
pub trait ChatMemoryStore: Send + Sync {
    /// Read the session's turns. `Ok(vec![])` means confirmed empty; a
    /// failure to reach the store is an `Err`.
    async fn get(&self, session_id: &str) -> Result<Vec<ChatTurn>>;

    /// Replace the session's turns with the admitted subset of `turns`
    /// and refresh the lease.
    async fn put(&self, session_id: &str, turns: &[ChatTurn]) -> Result<()>;

    /// Remove the session. Deleting a missing session succeeds.
    async fn delete(&self, session_id: &str) -> Result<()>;

    fn policy(&self) -> &MemoryPolicy;

    /// Degraded read: failures are logged and reported as an empty history.
    /// Callers cannot tell "no memory" from "store down" through this path.
    async fn get_or_empty(&self, session_id: &str) -> Vec<ChatTurn> {
        match self.get(session_id).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "Working memory read failed, continuing with empty history"
                );
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Lease {
    turns: Vec<ChatTurn>,
    expires_at: Instant,
}

/// Working memory kept in this process, with the same policy and lease
/// semantics as the remote store. Useful for local runs and tests.
///
/// Lapsed leases are dropped when their session is read and on every write.
#[derive(Clone)]
pub struct InMemoryChatStore {
    policy: MemoryPolicy,
    sessions: Arc<RwLock<HashMap<String, Lease>>>,
}

impl InMemoryChatStore {
    pub fn new(policy: MemoryPolicy) -> Self {
        Self {
            policy,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.policy.ttl_seconds())
    }

    /// Number of sessions whose lease has not lapsed.
    pub async fn live_sessions(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|lease| lease.expires_at > now)
            .count()
    }
}

#[async_trait]
impl ChatMemoryStore for InMemoryChatStore {
    async fn get(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        let mut sessions = self.sessions.write().await;
        let Some(lease) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };

        if lease.expires_at <= Instant::now() {
            debug!(session_id = %session_id, "Working memory lease lapsed");
            sessions.remove(session_id);
            return Ok(Vec::new());
        }

        Ok(self.policy.filter(&lease.turns))
    }

    async fn put(&self, session_id: &str, turns: &[ChatTurn]) -> Result<()> {
        let stored = self.policy.filter(turns);
        debug!(
            session_id = %session_id,
            offered = turns.len(),
            stored = stored.len(),
            "Storing working memory"
        );

        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, lease| lease.expires_at > now);
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!(pruned, "Dropped lapsed working memory leases");
        }

        sessions.insert(
            session_id.to_string(),
            Lease {
                turns: stored,
                expires_at: now + self.ttl(),
            },
        );
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        if self.sessions.write().await.remove(session_id).is_none() {
            debug!(session_id = %session_id, "No working memory to delete");
        }
        Ok(())
    }

    fn policy(&self) -> &MemoryPolicy {
        &self.policy
    }
}
