//! Search client for long-term memory on the agent memory server.

use std::time::Duration;

use recall_common::{RecallError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Equality filter in the memory server's search DSL.
#[derive(Debug, Clone, Serialize)]
struct EqFilter<'a> {
    eq: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct SearchBody<'a> {
    text: &'a str,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<EqFilter<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<EqFilter<'a>>,
}

/// A long-term search: free text plus optional user and namespace scope.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub text: String,
    pub limit: usize,
    pub user_id: Option<String>,
    pub namespace: Option<String>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: DEFAULT_SEARCH_LIMIT,
            user_id: None,
            namespace: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// One stored fact returned by a search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemoryRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    /// Vector distance from the query; smaller is closer.
    #[serde(default)]
    pub dist: Option<f64>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    memories: Vec<MemoryRecord>,
}

pub struct LongTermMemoryClient {
    search_url: Url,
    http_client: reqwest::Client,
}

impl LongTermMemoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(RecallError::Config("memory server base_url is required".into()));
        }
        let mut search_url = Url::parse(base_url)
            .map_err(|e| RecallError::Config(format!("invalid memory server URL '{base_url}': {e}")))?;
        search_url
            .path_segments_mut()
            .map_err(|_| RecallError::Config(format!("memory server URL '{base_url}' cannot be a base")))?
            .pop_if_empty()
            .extend(["v1", "long-term-memory", "search"]);

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecallError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            search_url,
            http_client,
        })
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<MemoryRecord>> {
        let body = SearchBody {
            text: &request.text,
            limit: request.limit,
            user_id: request.user_id.as_deref().map(|eq| EqFilter { eq }),
            namespace: request.namespace.as_deref().map(|eq| EqFilter { eq }),
        };
        debug!(
            limit = request.limit,
            user_scoped = request.user_id.is_some(),
            namespace = ?request.namespace,
            "Searching long-term memory"
        );

        let response = self
            .http_client
            .post(self.search_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RecallError::transport(format!("Long-term memory search timed out: {e}"))
                } else {
                    RecallError::transport(format!("Long-term memory search failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RecallError::transport_status(
                status.as_u16(),
                format!("Long-term memory search rejected: {text}"),
            ));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            RecallError::transport(format!("Malformed long-term memory response: {e}"))
        })?;
        debug!(hits = body.memories.len(), "Long-term memory search complete");
        Ok(body.memories)
    }
}
