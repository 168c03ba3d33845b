//! Working memory backed by the remote agent memory server.
//!
//! Endpoints (all scoped by the policy namespace):
//!
//! - `GET    /v1/working-memory/{session_id}?namespace=..` -> `{messages: [{role, content}]}`
//! - `PUT    /v1/working-memory/{session_id}` full replace, refreshes the TTL lease
//! - `DELETE /v1/working-memory/{session_id}?namespace=..` (404 counts as deleted)

use std::time::Duration;

use async_trait::async_trait;
use recall_common::{ChatTurn, RecallError, Result, Role, WireMessage};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::policy::{MemoryPolicy, MemoryPolicyBuilder};
use crate::store::ChatMemoryStore;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Hint telling the memory server how to fold expiring turns into
/// long-term facts. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionStrategy {
    pub strategy: String,
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl Default for RetentionStrategy {
    fn default() -> Self {
        Self {
            strategy: "discrete".to_string(),
            config: empty_object(),
        }
    }
}

#[derive(Deserialize)]
struct WorkingMemoryResponse {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Serialize)]
struct WorkingMemoryUpdate<'a> {
    session_id: &'a str,
    messages: Vec<WireMessage>,
    namespace: &'a str,
    ttl_seconds: u64,
    long_term_memory_strategy: &'a RetentionStrategy,
}

pub struct WorkingMemoryStore {
    base_url: Url,
    policy: MemoryPolicy,
    retention: RetentionStrategy,
    http_client: reqwest::Client,
}

impl WorkingMemoryStore {
    pub fn builder() -> WorkingMemoryStoreBuilder {
        WorkingMemoryStoreBuilder::default()
    }

    fn session_url(&self, session_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RecallError::Config(format!("cannot use {} as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["v1", "working-memory", session_id]);
        Ok(url)
    }

    async fn fetch(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        let url = self.session_url(session_id)?;
        debug!(session_id = %session_id, namespace = %self.policy.namespace(), "Reading working memory");

        let response = self
            .http_client
            .get(url)
            .query(&[("namespace", self.policy.namespace())])
            .send()
            .await
            .map_err(|e| transport_error("Working memory read", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(session_id = %session_id, "No working memory for session");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecallError::transport_status(
                status.as_u16(),
                format!("Working memory read rejected: {body}"),
            ));
        }

        let body: WorkingMemoryResponse = response
            .json()
            .await
            .map_err(|e| RecallError::transport(format!("Malformed working memory response: {e}")))?;

        let turns = self.admit(session_id, body.messages);
        debug!(session_id = %session_id, count = turns.len(), "Loaded working memory");
        Ok(turns)
    }

    /// Map wire messages to turns, dropping unknown roles and roles the
    /// policy excludes.
    fn admit(&self, session_id: &str, messages: Vec<WireMessage>) -> Vec<ChatTurn> {
        let mut turns = Vec::with_capacity(messages.len());
        for message in messages {
            let turn = ChatTurn::from(message);
            if let Role::Unknown(ref raw) = turn.role {
                warn!(session_id = %session_id, role = %raw, "Unknown message role, dropping");
                continue;
            }
            if self.policy.admits(&turn.role) {
                turns.push(turn);
            }
        }
        turns
    }
}

fn transport_error(action: &str, e: reqwest::Error) -> RecallError {
    if e.is_timeout() {
        RecallError::transport(format!("{action} timed out: {e}"))
    } else {
        RecallError::transport(format!("{action} failed: {e}"))
    }
}

#[async_trait]
impl ChatMemoryStore for WorkingMemoryStore {
    async fn get(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        let result = self.fetch(session_id).await;
        if let Err(ref e) = result {
            error!(session_id = %session_id, error = %e, "Error reading working memory");
        }
        result
    }

    async fn put(&self, session_id: &str, turns: &[ChatTurn]) -> Result<()> {
        let messages: Vec<WireMessage> = self
            .policy
            .filter(turns)
            .iter()
            .map(WireMessage::from)
            .collect();

        let body = WorkingMemoryUpdate {
            session_id,
            messages,
            namespace: self.policy.namespace(),
            ttl_seconds: self.policy.ttl_seconds(),
            long_term_memory_strategy: &self.retention,
        };
        debug!(
            session_id = %session_id,
            offered = turns.len(),
            stored = body.messages.len(),
            ttl_seconds = body.ttl_seconds,
            "Writing working memory"
        );

        let url = self.session_url(session_id)?;
        let result = match self.http_client.put(url).json(&body).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                Err(RecallError::transport_status(
                    status.as_u16(),
                    format!("Working memory write rejected: {text}"),
                ))
            }
            Err(e) => Err(transport_error("Working memory write", e)),
        };

        if let Err(ref e) = result {
            error!(session_id = %session_id, error = %e, "Error updating working memory");
        }
        result
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let url = self.session_url(session_id)?;
        let response = self
            .http_client
            .delete(url)
            .query(&[("namespace", self.policy.namespace())])
            .send()
            .await
            .map_err(|e| {
                let err = transport_error("Working memory delete", e);
                error!(session_id = %session_id, error = %err, "Error deleting working memory");
                err
            })?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
                info!(session_id = %session_id, "Deleted working memory");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                warn!(session_id = %session_id, "Working memory not found, nothing to delete");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                error!(
                    session_id = %session_id,
                    status = status.as_u16(),
                    body = %body,
                    "Failed to delete working memory"
                );
                Err(RecallError::transport_status(
                    status.as_u16(),
                    format!("Working memory delete rejected: {body}"),
                ))
            }
        }
    }

    fn policy(&self) -> &MemoryPolicy {
        &self.policy
    }
}

#[derive(Debug, Default)]
pub struct WorkingMemoryStoreBuilder {
    base_url: Option<String>,
    policy: MemoryPolicyBuilder,
    retention: Option<RetentionStrategy>,
    timeout: Option<Duration>,
}

impl WorkingMemoryStoreBuilder {
    /// Base URL of the memory server. Required.
    pub fn base_url(mut self, value: impl Into<String>) -> Self {
        self.base_url = Some(value.into());
        self
    }

    pub fn ttl_seconds(mut self, value: u64) -> Self {
        self.policy = self.policy.ttl_seconds(value);
        self
    }

    pub fn include_system(mut self, value: bool) -> Self {
        self.policy = self.policy.include_system(value);
        self
    }

    pub fn include_assistant(mut self, value: bool) -> Self {
        self.policy = self.policy.include_assistant(value);
        self
    }

    pub fn include_tool(mut self, value: bool) -> Self {
        self.policy = self.policy.include_tool(value);
        self
    }

    pub fn namespace(mut self, value: impl Into<String>) -> Self {
        self.policy = self.policy.namespace(value);
        self
    }

    /// Replace every policy setting at once.
    pub fn policy(mut self, policy: &MemoryPolicy) -> Self {
        self.policy = MemoryPolicy::builder()
            .ttl_seconds(policy.ttl_seconds())
            .include_system(policy.include_system())
            .include_assistant(policy.include_assistant())
            .include_tool(policy.include_tool())
            .namespace(policy.namespace());
        self
    }

    pub fn retention_strategy(mut self, value: RetentionStrategy) -> Self {
        self.retention = Some(value);
        self
    }

    /// Per-request deadline for every call to the memory server.
    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    pub fn build(self) -> Result<WorkingMemoryStore> {
        let raw = self
            .base_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| RecallError::Config("memory server base_url is required".into()))?;
        let base_url = Url::parse(&raw)
            .map_err(|e| RecallError::Config(format!("invalid memory server URL '{raw}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RecallError::Config(format!(
                "memory server URL '{raw}' cannot be a base"
            )));
        }

        let policy = self.policy.build()?;
        let http_client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| RecallError::Config(format!("Failed to build HTTP client: {e}")))?;

        info!(
            base_url = %base_url,
            namespace = %policy.namespace(),
            ttl_seconds = policy.ttl_seconds(),
            "Working memory store configured"
        );

        Ok(WorkingMemoryStore {
            base_url,
            policy,
            retention: self.retention.unwrap_or_default(),
            http_client,
        })
    }
}
