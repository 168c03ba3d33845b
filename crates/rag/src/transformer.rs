//! Query rewriting before retrieval.

use std::sync::Arc;

use async_trait::async_trait;
use recall_common::{ChatTurn, RecallError, Result, Role};
use recall_llm::{LlmClient, LlmRequest};
use tracing::debug;

use crate::query::Query;

#[async_trait]
pub trait QueryTransformer: Send + Sync {
    async fn transform(&self, query: &Query) -> Result<Query>;
}

const COMPRESS_SYSTEM_PROMPT: &str = "\
You rewrite follow-up questions for a search engine. Read the conversation and \
the latest user query, then reformulate the query as a single standalone search \
query that keeps every detail needed to find relevant information. Reply with \
the rewritten query only: no preamble, no quotes, no explanation.";

/// Folds conversational context into a standalone query with one model
/// call. A query with no history is already standalone and passes through.
pub struct CompressingQueryTransformer {
    llm: Arc<dyn LlmClient>,
}

impl CompressingQueryTransformer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn render(query: &Query) -> String {
        let conversation = query
            .history
            .iter()
            .filter_map(format_turn)
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Conversation:\n{conversation}\n\nUser query: {}\n\nStandalone query:",
            query.text
        )
    }
}

fn format_turn(turn: &ChatTurn) -> Option<String> {
    let speaker = match turn.role {
        Role::User => "User",
        Role::Assistant => "AI",
        _ => return None,
    };
    Some(format!("{speaker}: {}", turn.text))
}

#[async_trait]
impl QueryTransformer for CompressingQueryTransformer {
    async fn transform(&self, query: &Query) -> Result<Query> {
        if !query.history.iter().any(|turn| format_turn(turn).is_some()) {
            return Ok(query.clone());
        }

        let mut request = LlmRequest::prompt(COMPRESS_SYSTEM_PROMPT, Self::render(query));
        request.temperature = Some(0.0);

        let response = self.llm.complete(request).await?;
        let compressed = response.content.trim().trim_matches('"').trim();
        if compressed.is_empty() {
            return Err(RecallError::model("query compression returned no text"));
        }

        debug!(original = %query.text, compressed = %compressed, "Compressed query");
        Ok(query.rewritten(compressed))
    }
}
