//! The retrieval pipeline: transform, route, retrieve, aggregate, inject.

use std::sync::Arc;

use futures::TryStreamExt;
use futures::future::try_join_all;
use recall_common::{RecallError, Result};
use tracing::{debug, info, instrument};

use crate::aggregator::{ConcatenatingAggregator, ContentAggregator};
use crate::content::Content;
use crate::injector::{ContentInjector, DefaultContentInjector};
use crate::query::Query;
use crate::router::QueryRouter;
use crate::transformer::QueryTransformer;

/// Outcome of one augmentation.
#[derive(Debug, Clone)]
pub struct AugmentationResult {
    /// The prompt to send to the answering model.
    pub prompt: String,
    /// Aggregated content, in injection order.
    pub contents: Vec<Content>,
    /// The query the retrievers actually saw, after transformation.
    pub query: Query,
}

/// Runs the stages for every user message. Holds no per-request state, so a
/// single instance can serve concurrent requests.
pub struct RetrievalAugmentor {
    transformer: Option<Arc<dyn QueryTransformer>>,
    router: Arc<dyn QueryRouter>,
    aggregator: Arc<dyn ContentAggregator>,
    injector: Arc<dyn ContentInjector>,
}

impl RetrievalAugmentor {
    pub fn builder() -> RetrievalAugmentorBuilder {
        RetrievalAugmentorBuilder::default()
    }

    /// Any failure in a stage aborts the whole request; partial retrieval
    /// results are never injected.
    #[instrument(skip_all, fields(user_id = %query.user_id))]
    pub async fn augment(&self, query: &Query, user_message: &str) -> Result<AugmentationResult> {
        let effective = match &self.transformer {
            Some(transformer) => transformer.transform(query).await?,
            None => query.clone(),
        };
        if effective.text != query.text {
            debug!(original = %query.text, rewritten = %effective.text, "Query transformed");
        }

        let retrievers = self.router.route(&effective).await?;
        let ids: Vec<&str> = retrievers.iter().map(|r| r.id()).collect();
        debug!(retrievers = ?ids, "Query routed");

        let batches = try_join_all(
            retrievers
                .iter()
                .map(|retriever| retriever.retrieve(&effective).try_collect::<Vec<_>>()),
        )
        .await?;

        let contents = self.aggregator.aggregate(query, batches).await?;
        let prompt = self.injector.inject(&contents, user_message);

        info!(
            retrievers = retrievers.len(),
            contents = contents.len(),
            "Augmented user message"
        );
        Ok(AugmentationResult {
            prompt,
            contents,
            query: effective,
        })
    }
}

#[derive(Default)]
pub struct RetrievalAugmentorBuilder {
    transformer: Option<Arc<dyn QueryTransformer>>,
    router: Option<Arc<dyn QueryRouter>>,
    aggregator: Option<Arc<dyn ContentAggregator>>,
    injector: Option<Arc<dyn ContentInjector>>,
}

impl RetrievalAugmentorBuilder {
    pub fn transformer(mut self, transformer: Arc<dyn QueryTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn router(mut self, router: Arc<dyn QueryRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn aggregator(mut self, aggregator: Arc<dyn ContentAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn injector(mut self, injector: Arc<dyn ContentInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn build(self) -> Result<RetrievalAugmentor> {
        let router = self
            .router
            .ok_or_else(|| RecallError::Config("retrieval augmentor needs a query router".into()))?;
        Ok(RetrievalAugmentor {
            transformer: self.transformer,
            router,
            aggregator: self
                .aggregator
                .unwrap_or_else(|| Arc::new(ConcatenatingAggregator)),
            injector: self
                .injector
                .unwrap_or_else(|| Arc::new(DefaultContentInjector::default())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::{ContentRetriever, ContentStream};
    use crate::router::StaticRouter;
    use async_trait::async_trait;
    use futures::{StreamExt, stream};
    use std::sync::Mutex;

    /// Yields fixed texts and records the query text it was asked about.
    struct Canned {
        id: &'static str,
        texts: Vec<&'static str>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl ContentRetriever for Canned {
        fn id(&self) -> &str {
            self.id
        }

        fn retrieve(&self, query: &Query) -> ContentStream {
            self.seen.lock().unwrap().push(query.text.clone());
            let source = self.id.to_string();
            let items: Vec<Result<Content>> = self
                .texts
                .iter()
                .map(|t| Ok(Content::new(*t, source.clone())))
                .collect();
            stream::iter(items).boxed()
        }
    }

    struct Broken;

    impl ContentRetriever for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        fn retrieve(&self, _query: &Query) -> ContentStream {
            stream::once(async { Err(RecallError::retrieval("broken", "index offline")) }).boxed()
        }
    }

    struct Uppercase;

    #[async_trait]
    impl QueryTransformer for Uppercase {
        async fn transform(&self, query: &Query) -> Result<Query> {
            Ok(query.rewritten(query.text.to_uppercase()))
        }
    }

    fn canned(
        id: &'static str,
        texts: Vec<&'static str>,
    ) -> (Arc<dyn ContentRetriever>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let retriever = Canned {
            id,
            texts,
            seen: seen.clone(),
        };
        (Arc::new(retriever), seen)
    }

    #[tokio::test]
    async fn builder_requires_a_router() {
        assert!(matches!(
            RetrievalAugmentor::builder().build(),
            Err(RecallError::Config(_))
        ));
    }

    #[tokio::test]
    async fn all_routed_sources_are_injected() {
        let (user, _) = canned("user-memory", vec!["likes tea"]);
        let (kb, _) = canned("knowledge-base", vec!["tea has caffeine"]);
        let augmentor = RetrievalAugmentor::builder()
            .router(Arc::new(StaticRouter::new(vec![user, kb]).unwrap()))
            .build()
            .unwrap();

        let result = augmentor
            .augment(&Query::new("what to drink", "u-1"), "what to drink")
            .await
            .unwrap();
        assert_eq!(
            result.prompt,
            "what to drink\n\n[Context]\nlikes tea\n\ntea has caffeine"
        );
        assert_eq!(result.contents.len(), 2);
    }

    #[tokio::test]
    async fn retrievers_see_the_transformed_query() {
        let (user, seen) = canned("user-memory", vec![]);
        let augmentor = RetrievalAugmentor::builder()
            .transformer(Arc::new(Uppercase))
            .router(Arc::new(StaticRouter::new(vec![user]).unwrap()))
            .build()
            .unwrap();

        let result = augmentor
            .augment(&Query::new("hello", "u-1"), "hello")
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["HELLO".to_string()]);
        assert_eq!(result.query.text, "HELLO");
        // The prompt carries the user's own words, not the rewrite.
        assert!(result.prompt.starts_with("hello\n"));
    }

    #[tokio::test]
    async fn one_failing_retriever_fails_the_request() {
        let (user, _) = canned("user-memory", vec!["likes tea"]);
        let augmentor = RetrievalAugmentor::builder()
            .router(Arc::new(StaticRouter::new(vec![user, Arc::new(Broken)]).unwrap()))
            .build()
            .unwrap();

        let err = augmentor
            .augment(&Query::new("q", "u-1"), "q")
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::Retrieval { ref retriever, .. } if retriever == "broken"));
    }
}
