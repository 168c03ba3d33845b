//! Merging, scoring, and filtering retrieved content.

use std::sync::Arc;

use async_trait::async_trait;
use recall_common::{RecallError, Result};
use recall_llm::ScoringModel;
use tracing::debug;

use crate::content::{Content, dedup_by_text};
use crate::query::Query;

/// Combines one batch of content per invoked retriever into the list that
/// gets injected.
#[async_trait]
pub trait ContentAggregator: Send + Sync {
    /// `query` is the original, untransformed query.
    async fn aggregate(&self, query: &Query, batches: Vec<Vec<Content>>) -> Result<Vec<Content>>;
}

/// Concatenates batches in the order given, keeping each retriever's own
/// ordering, then drops duplicate texts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatenatingAggregator;

#[async_trait]
impl ContentAggregator for ConcatenatingAggregator {
    async fn aggregate(&self, _query: &Query, batches: Vec<Vec<Content>>) -> Result<Vec<Content>> {
        Ok(dedup_by_text(batches.into_iter().flatten().collect()))
    }
}

/// Re-scores every item against the query with an external scoring model,
/// drops items under `min_score`, and orders the rest best first. Ties keep
/// retrieval order. A scoring failure fails the aggregation; there is no
/// retry here.
pub struct RerankingAggregator {
    scorer: Arc<dyn ScoringModel>,
    min_score: Option<f64>,
    max_results: Option<usize>,
}

impl RerankingAggregator {
    pub fn new(scorer: Arc<dyn ScoringModel>) -> Self {
        Self {
            scorer,
            min_score: None,
            max_results: None,
        }
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

#[async_trait]
impl ContentAggregator for RerankingAggregator {
    async fn aggregate(&self, query: &Query, batches: Vec<Vec<Content>>) -> Result<Vec<Content>> {
        let mut items: Vec<Content> = batches.into_iter().flatten().collect();
        if items.is_empty() {
            return Ok(items);
        }

        let texts: Vec<String> = items.iter().map(|c| c.text.clone()).collect();
        let scores = self.scorer.score_all(&query.text, &texts).await?;
        if scores.len() != items.len() {
            return Err(RecallError::model(format!(
                "scoring model returned {} scores for {} items",
                scores.len(),
                items.len()
            )));
        }
        for (item, score) in items.iter_mut().zip(scores) {
            item.score = Some(score);
        }

        let candidates = items.len();
        let mut kept: Vec<Content> = dedup_by_text(items)
            .into_iter()
            .filter(|c| match self.min_score {
                Some(min) => c.score.is_some_and(|s| s >= min),
                None => true,
            })
            .collect();

        // Vec::sort_by is stable, so equal scores keep retrieval order.
        kept.sort_by(|a, b| {
            let a = a.score.unwrap_or(f64::NEG_INFINITY);
            let b = b.score.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        if let Some(max) = self.max_results {
            kept.truncate(max);
        }

        debug!(candidates, kept = kept.len(), min_score = ?self.min_score, "Reranked content");
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Scores by exact text lookup; unknown texts score zero.
    struct TableScorer(HashMap<&'static str, f64>);

    #[async_trait]
    impl ScoringModel for TableScorer {
        async fn score_all(&self, _query: &str, candidates: &[String]) -> Result<Vec<f64>> {
            Ok(candidates
                .iter()
                .map(|c| self.0.get(c.as_str()).copied().unwrap_or(0.0))
                .collect())
        }
    }

    struct BrokenScorer;

    #[async_trait]
    impl ScoringModel for BrokenScorer {
        async fn score_all(&self, _query: &str, _candidates: &[String]) -> Result<Vec<f64>> {
            Err(RecallError::model_status(500, "scorer crashed"))
        }
    }

    fn query() -> Query {
        Query::new("q", "u-1")
    }

    fn texts(items: &[Content]) -> Vec<&str> {
        items.iter().map(|c| c.text.as_str()).collect()
    }

    #[tokio::test]
    async fn concatenation_preserves_batch_and_item_order() {
        let batches = vec![
            vec![Content::new("u1", "user-memory"), Content::new("u2", "user-memory")],
            vec![Content::new("k1", "knowledge-base")],
        ];
        let out = ConcatenatingAggregator.aggregate(&query(), batches).await.unwrap();
        assert_eq!(texts(&out), vec!["u1", "u2", "k1"]);
    }

    #[tokio::test]
    async fn threshold_filters_and_orders_by_score() {
        let scorer = TableScorer(HashMap::from([("a", 0.9), ("b", 0.5), ("c", 0.81)]));
        let aggregator = RerankingAggregator::new(Arc::new(scorer)).with_min_score(0.8);

        let batches = vec![
            vec![Content::new("a", "user-memory"), Content::new("b", "user-memory")],
            vec![Content::new("c", "knowledge-base")],
        ];
        let out = aggregator.aggregate(&query(), batches).await.unwrap();
        assert_eq!(texts(&out), vec!["a", "c"]);
        assert_eq!(out[1].score, Some(0.81));
    }

    #[tokio::test]
    async fn ties_keep_retrieval_order() {
        let scorer = TableScorer(HashMap::from([("x", 0.5), ("y", 0.7), ("z", 0.5)]));
        let aggregator = RerankingAggregator::new(Arc::new(scorer));

        let batches = vec![
            vec![Content::new("x", "a")],
            vec![Content::new("y", "b"), Content::new("z", "b")],
        ];
        let out = aggregator.aggregate(&query(), batches).await.unwrap();
        assert_eq!(texts(&out), vec!["y", "x", "z"]);
    }

    #[tokio::test]
    async fn duplicates_collapse_to_the_higher_score() {
        let scorer = TableScorer(HashMap::from([("Likes tea", 0.6), ("likes  TEA", 0.95)]));
        let aggregator = RerankingAggregator::new(Arc::new(scorer));

        let batches = vec![
            vec![Content::new("Likes tea", "user-memory")],
            vec![Content::new("likes  TEA", "knowledge-base")],
        ];
        let out = aggregator.aggregate(&query(), batches).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, Some(0.95));
        assert_eq!(out[0].source, "knowledge-base");
    }

    #[tokio::test]
    async fn max_results_truncates_after_sorting() {
        let scorer = TableScorer(HashMap::from([("a", 0.1), ("b", 0.9), ("c", 0.5)]));
        let aggregator = RerankingAggregator::new(Arc::new(scorer)).with_max_results(2);
        let batches = vec![vec![
            Content::new("a", "s"),
            Content::new("b", "s"),
            Content::new("c", "s"),
        ]];
        let out = aggregator.aggregate(&query(), batches).await.unwrap();
        assert_eq!(texts(&out), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn scoring_failure_fails_the_aggregation() {
        let aggregator = RerankingAggregator::new(Arc::new(BrokenScorer));
        let batches = vec![vec![Content::new("a", "s")]];
        let err = aggregator.aggregate(&query(), batches).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn empty_input_skips_scoring() {
        let aggregator = RerankingAggregator::new(Arc::new(BrokenScorer));
        assert!(aggregator.aggregate(&query(), vec![vec![], vec![]]).await.unwrap().is_empty());
    }
}
