//! Relevance scoring models used for reranking retrieved content.

use std::time::Duration;

use async_trait::async_trait;
use recall_common::{RecallError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scores `(query, candidate)` pairs. Higher means more relevant.
#[async_trait]
pub trait ScoringModel: Send + Sync {
    /// One score per candidate, in candidate order.
    async fn score_all(&self, query: &str, candidates: &[String]) -> Result<Vec<f64>>;
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct RerankHit {
    index: usize,
    score: f64,
}

/// Cross-encoder reranker behind an HTTP `/rerank` endpoint
/// (text-embeddings-inference and compatible servers).
pub struct HttpScoringModel {
    base_url: String,
    model: Option<String>,
    http_client: reqwest::Client,
}

impl HttpScoringModel {
    pub fn new(base_url: impl Into<String>, model: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(RecallError::Config("scoring model base_url is required".into()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecallError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http_client,
        })
    }
}

#[async_trait]
impl ScoringModel for HttpScoringModel {
    async fn score_all(&self, query: &str, candidates: &[String]) -> Result<Vec<f64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        debug!(candidates = candidates.len(), "Scoring candidates");

        let body = RerankRequest {
            query,
            texts: candidates,
            model: self.model.as_deref(),
        };
        let response = self
            .http_client
            .post(format!("{}/rerank", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RecallError::model(format!("Scoring request timed out: {e}"))
                } else {
                    RecallError::model(format!("Scoring request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RecallError::model_status(
                status.as_u16(),
                format!("Scoring API error: {body_text}"),
            ));
        }

        let hits: Vec<RerankHit> = response
            .json()
            .await
            .map_err(|e| {
                RecallError::model_status(
                    status.as_u16(),
                    format!("Failed to parse scoring response: {e}"),
                )
            })?;

        let mut scores = vec![None; candidates.len()];
        for hit in hits {
            let slot = scores.get_mut(hit.index).ok_or_else(|| {
                RecallError::model(format!("Scoring response index {} out of range", hit.index))
            })?;
            *slot = Some(hit.score);
        }
        scores
            .into_iter()
            .enumerate()
            .map(|(i, score)| {
                score.ok_or_else(|| RecallError::model(format!("No score returned for candidate {i}")))
            })
            .collect()
    }
}
