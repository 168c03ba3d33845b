//! Content retrievers over long-term memory.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use recall_common::{RecallError, Result};
use recall_memory::{LongTermMemoryClient, SearchRequest};

use crate::content::Content;
use crate::query::Query;

pub const USER_MEMORY_ID: &str = "user-memory";
pub const KNOWLEDGE_BASE_ID: &str = "knowledge-base";

/// A lazy, finite sequence of content. Nothing is fetched until it is
/// polled; a search failure surfaces as an `Err` item.
pub type ContentStream = BoxStream<'static, Result<Content>>;

/// One memory source.
pub trait ContentRetriever: Send + Sync {
    /// Stable identity, recorded as the `source` of every item produced.
    fn id(&self) -> &str;

    /// Each call runs a fresh search.
    fn retrieve(&self, query: &Query) -> ContentStream;
}

fn search_stream(
    client: Arc<LongTermMemoryClient>,
    source: String,
    request: SearchRequest,
) -> ContentStream {
    stream::once(async move {
        match client.search(&request).await {
            Ok(records) => Ok((source, records)),
            Err(e) => Err(RecallError::retrieval(source, e.to_string())),
        }
    })
    .map_ok(|(source, records)| {
        stream::iter(
            records
                .into_iter()
                .map(move |record| Ok::<_, RecallError>(Content::from_record(record, &source))),
        )
    })
    .try_flatten()
    .boxed()
}

/// Facts remembered about the requesting user.
pub struct UserMemoryRetriever {
    client: Arc<LongTermMemoryClient>,
    namespace: Option<String>,
    limit: usize,
}

impl UserMemoryRetriever {
    pub fn new(client: Arc<LongTermMemoryClient>, limit: usize) -> Self {
        Self {
            client,
            namespace: None,
            limit,
        }
    }

    /// Restrict the search to one namespace of user facts.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl ContentRetriever for UserMemoryRetriever {
    fn id(&self) -> &str {
        USER_MEMORY_ID
    }

    fn retrieve(&self, query: &Query) -> ContentStream {
        if query.user_id.trim().is_empty() {
            return stream::once(async {
                Err(RecallError::retrieval(
                    USER_MEMORY_ID,
                    "query has no user id to scope the search",
                ))
            })
            .boxed();
        }

        let mut request = SearchRequest::new(&query.text)
            .limit(self.limit)
            .user_id(&query.user_id);
        if let Some(ref namespace) = self.namespace {
            request = request.namespace(namespace);
        }
        search_stream(self.client.clone(), USER_MEMORY_ID.to_string(), request)
    }
}

/// Shared knowledge that is not about any particular user.
pub struct KnowledgeBaseRetriever {
    client: Arc<LongTermMemoryClient>,
    namespace: String,
    limit: usize,
}

impl KnowledgeBaseRetriever {
    pub fn new(client: Arc<LongTermMemoryClient>, namespace: impl Into<String>, limit: usize) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            limit,
        }
    }
}

impl ContentRetriever for KnowledgeBaseRetriever {
    fn id(&self) -> &str {
        KNOWLEDGE_BASE_ID
    }

    fn retrieve(&self, query: &Query) -> ContentStream {
        let request = SearchRequest::new(&query.text)
            .limit(self.limit)
            .namespace(&self.namespace);
        search_stream(self.client.clone(), KNOWLEDGE_BASE_ID.to_string(), request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_client() -> Arc<LongTermMemoryClient> {
        Arc::new(LongTermMemoryClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap())
    }

    #[tokio::test]
    async fn user_retriever_requires_identity() {
        let retriever = UserMemoryRetriever::new(unreachable_client(), 5);
        let err = retriever
            .retrieve(&Query::new("what do I like?", ""))
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::Retrieval { ref retriever, .. } if retriever == USER_MEMORY_ID));
    }

    #[tokio::test]
    async fn search_failure_is_a_retrieval_error_not_an_empty_result() {
        let retriever = KnowledgeBaseRetriever::new(unreachable_client(), "kb", 5);
        let result = retriever
            .retrieve(&Query::new("capital of France", "u-1"))
            .try_collect::<Vec<_>>()
            .await;
        assert!(matches!(result, Err(RecallError::Retrieval { .. })));
    }

    #[test]
    fn retrievers_report_their_identity() {
        let client = unreachable_client();
        assert_eq!(UserMemoryRetriever::new(client.clone(), 1).id(), "user-memory");
        assert_eq!(KnowledgeBaseRetriever::new(client, "kb", 1).id(), "knowledge-base");
    }
}
