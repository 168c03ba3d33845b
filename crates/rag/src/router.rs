//! Query routing: which memory sources answer a given query.

use std::sync::Arc;

use async_trait::async_trait;
use recall_common::{RecallError, Result};
use recall_llm::{LlmClient, LlmRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::query::Query;
use crate::retriever::ContentRetriever;

/// Picks the retrievers to run for a query. The returned order carries no
/// meaning beyond presentation; aggregation must not depend on it.
#[async_trait]
pub trait QueryRouter: Send + Sync {
    async fn route(&self, query: &Query) -> Result<Vec<Arc<dyn ContentRetriever>>>;
}

/// Always routes to every configured retriever.
pub struct StaticRouter {
    retrievers: Vec<Arc<dyn ContentRetriever>>,
}

impl StaticRouter {
    pub fn new(retrievers: Vec<Arc<dyn ContentRetriever>>) -> Result<Self> {
        if retrievers.is_empty() {
            return Err(RecallError::Config(
                "static router needs at least one retriever".into(),
            ));
        }
        Ok(Self { retrievers })
    }
}

#[async_trait]
impl QueryRouter for StaticRouter {
    async fn route(&self, _query: &Query) -> Result<Vec<Arc<dyn ContentRetriever>>> {
        Ok(self.retrievers.clone())
    }
}

/// What to do when the classifier's answer names no usable retriever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Favour recall: query every source.
    #[default]
    RouteToAll,
    /// Query nothing; the prompt goes out without context.
    DoNotRoute,
    /// Abort the request.
    Fail,
}

/// A retriever plus the natural-language description the classifier sees.
/// The retriever itself never reads the description.
#[derive(Clone)]
pub struct RetrieverDescriptor {
    pub retriever: Arc<dyn ContentRetriever>,
    pub description: String,
}

/// Asks a language model which sources fit the query.
pub struct LanguageModelRouter {
    llm: Arc<dyn LlmClient>,
    descriptors: Vec<RetrieverDescriptor>,
    fallback: FallbackStrategy,
}

impl LanguageModelRouter {
    pub fn builder() -> LanguageModelRouterBuilder {
        LanguageModelRouterBuilder::default()
    }

    fn render(&self, query: &Query) -> String {
        let options = self
            .descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| format!("{}: {}", i + 1, d.description))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Data sources:\n{options}\n\nUser query: {}", query.text)
    }

    fn all(&self) -> Vec<Arc<dyn ContentRetriever>> {
        self.descriptors.iter().map(|d| d.retriever.clone()).collect()
    }

    fn fall_back(&self, answer: &str) -> Result<Vec<Arc<dyn ContentRetriever>>> {
        warn!(answer = %answer, fallback = ?self.fallback, "Routing answer unusable, falling back");
        match self.fallback {
            FallbackStrategy::RouteToAll => Ok(self.all()),
            FallbackStrategy::DoNotRoute => Ok(Vec::new()),
            FallbackStrategy::Fail => Err(RecallError::model(format!(
                "query router could not classify the query (answer: {answer:?})"
            ))),
        }
    }
}

const ROUTING_SYSTEM_PROMPT: &str = "\
You decide which data sources can help answer a user query. You are given a \
numbered list of data sources and a query. Answer with the number of every \
relevant source, separated by commas (for example: 1, 3). Answer with the \
numbers only and nothing else.";

/// 1-based option numbers found in a classifier answer, in first-mention
/// order, ignoring anything outside `1..=options`.
pub fn parse_selection(answer: &str, options: usize) -> Vec<usize> {
    let mut picked = Vec::new();
    for token in answer.split(|c: char| !c.is_ascii_digit()) {
        let Ok(n) = token.parse::<usize>() else {
            continue;
        };
        if (1..=options).contains(&n) && !picked.contains(&n) {
            picked.push(n);
        }
    }
    picked
}

#[async_trait]
impl QueryRouter for LanguageModelRouter {
    async fn route(&self, query: &Query) -> Result<Vec<Arc<dyn ContentRetriever>>> {
        let mut request = LlmRequest::prompt(ROUTING_SYSTEM_PROMPT, self.render(query));
        request.temperature = Some(0.0);

        let answer = self.llm.complete(request).await?.content;
        let picked = parse_selection(&answer, self.descriptors.len());
        if picked.is_empty() {
            return self.fall_back(&answer);
        }

        let selected: Vec<Arc<dyn ContentRetriever>> = picked
            .into_iter()
            .map(|n| self.descriptors[n - 1].retriever.clone())
            .collect();
        debug!(
            selected = ?selected.iter().map(|r| r.id()).collect::<Vec<_>>(),
            "Routed query"
        );
        Ok(selected)
    }
}

#[derive(Default)]
pub struct LanguageModelRouterBuilder {
    llm: Option<Arc<dyn LlmClient>>,
    descriptors: Vec<RetrieverDescriptor>,
    fallback: FallbackStrategy,
}

impl LanguageModelRouterBuilder {
    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn retriever(
        mut self,
        retriever: Arc<dyn ContentRetriever>,
        description: impl Into<String>,
    ) -> Self {
        self.descriptors.push(RetrieverDescriptor {
            retriever,
            description: description.into(),
        });
        self
    }

    pub fn fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn build(self) -> Result<LanguageModelRouter> {
        let llm = self
            .llm
            .ok_or_else(|| RecallError::Config("language model router needs an LLM".into()))?;
        if self.descriptors.is_empty() {
            return Err(RecallError::Config(
                "language model router needs at least one retriever".into(),
            ));
        }
        if let Some(d) = self.descriptors.iter().find(|d| d.description.trim().is_empty()) {
            return Err(RecallError::Config(format!(
                "retriever '{}' has no description",
                d.retriever.id()
            )));
        }
        Ok(LanguageModelRouter {
            llm,
            descriptors: self.descriptors,
            fallback: self.fallback,
        })
    }
}
