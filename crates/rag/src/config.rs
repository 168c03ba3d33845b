//! TOML configuration and the composition root for the memory pipeline.
//!
//! ```toml
//! [memory_server]
//! base_url = "http://localhost:8000"
//!
//! [working_memory]
//! ttl_seconds = 300
//! include_assistant = true
//!
//! [llm]
//! provider = "ollama"
//! model = "llama3.2"
//!
//! [retrieval]
//! router = "dynamic"
//! compress_query = true
//!
//! [retrieval.rerank]
//! base_url = "http://localhost:8080"
//! min_score = 0.8
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use recall_common::RecallError;
use recall_llm::{HttpScoringModel, LlmClient, LlmConfig};
use recall_memory::long_term::DEFAULT_SEARCH_LIMIT;
use recall_memory::policy::{DEFAULT_NAMESPACE, DEFAULT_TTL_SECONDS};
use recall_memory::{LongTermMemoryClient, RetentionStrategy, WorkingMemoryStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregator::{ConcatenatingAggregator, ContentAggregator, RerankingAggregator};
use crate::augmentor::RetrievalAugmentor;
use crate::injector::{DefaultContentInjector, PromptTemplate};
use crate::retriever::{ContentRetriever, KnowledgeBaseRetriever, UserMemoryRetriever};
use crate::router::{FallbackStrategy, LanguageModelRouter, QueryRouter, StaticRouter};
use crate::transformer::CompressingQueryTransformer;

pub const DEFAULT_USER_MEMORY_DESCRIPTION: &str =
    "User specific memories like preferences, events, and interactions";
pub const DEFAULT_KNOWLEDGE_BASE_DESCRIPTION: &str =
    "General knowledge base (not really user related) with facts and data";
pub const DEFAULT_KNOWLEDGE_BASE_NAMESPACE: &str = "knowledge-base";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    pub memory_server: MemoryServerConfig,
    pub working_memory: WorkingMemoryConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryServerConfig {
    /// Required before any store or retriever can be built.
    pub base_url: Option<String>,
    #[serde(default = "default_memory_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_memory_timeout_ms() -> u64 {
    10_000
}

impl Default for MemoryServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_memory_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default)]
    pub include_system: bool,
    #[serde(default)]
    pub include_assistant: bool,
    #[serde(default)]
    pub include_tool: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub retention: RetentionStrategy,
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.into()
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            include_system: false,
            include_assistant: false,
            include_tool: false,
            namespace: default_namespace(),
            retention: RetentionStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterKind {
    /// Every query goes to every retriever.
    #[default]
    Static,
    /// A language model picks retrievers from their descriptions.
    Dynamic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub router: RouterKind,
    #[serde(default)]
    pub fallback: FallbackStrategy,
    #[serde(default)]
    pub compress_query: bool,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_kb_namespace")]
    pub knowledge_base_namespace: String,
    pub user_memory_namespace: Option<String>,
    #[serde(default = "default_user_description")]
    pub user_memory_description: String,
    #[serde(default = "default_kb_description")]
    pub knowledge_base_description: String,
    pub prompt_template: Option<String>,
    pub rerank: Option<RerankConfig>,
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_kb_namespace() -> String {
    DEFAULT_KNOWLEDGE_BASE_NAMESPACE.into()
}

fn default_user_description() -> String {
    DEFAULT_USER_MEMORY_DESCRIPTION.into()
}

fn default_kb_description() -> String {
    DEFAULT_KNOWLEDGE_BASE_DESCRIPTION.into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            router: RouterKind::default(),
            fallback: FallbackStrategy::default(),
            compress_query: false,
            search_limit: default_search_limit(),
            knowledge_base_namespace: default_kb_namespace(),
            user_memory_namespace: None,
            user_memory_description: default_user_description(),
            knowledge_base_description: default_kb_description(),
            prompt_template: None,
            rerank: None,
        }
    }
}

/// External scoring service used to rerank aggregated content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub base_url: String,
    pub model: Option<String>,
    /// Items scoring below this are dropped. `-inf` keeps everything.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    pub max_results: Option<usize>,
    #[serde(default = "default_rerank_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_min_score() -> f64 {
    0.8
}

fn default_rerank_timeout_ms() -> u64 {
    10_000
}

impl RecallConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)?;

        if config.llm.api_key.is_some() {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use the OPENAI_API_KEY environment variable instead.",
                path.display()
            );
        }

        Ok(config)
    }

    fn memory_server_url(&self) -> recall_common::Result<&str> {
        self.memory_server
            .base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| RecallError::Config("memory_server.base_url is required".into()))
    }

    fn memory_timeout(&self) -> Duration {
        Duration::from_millis(self.memory_server.timeout_ms)
    }

    /// The remote working memory store described by `[working_memory]`.
    pub fn working_memory_store(&self) -> recall_common::Result<WorkingMemoryStore> {
        let wm = &self.working_memory;
        WorkingMemoryStore::builder()
            .base_url(self.memory_server_url()?)
            .ttl_seconds(wm.ttl_seconds)
            .include_system(wm.include_system)
            .include_assistant(wm.include_assistant)
            .include_tool(wm.include_tool)
            .namespace(wm.namespace.clone())
            .retention_strategy(wm.retention.clone())
            .timeout(self.memory_timeout())
            .build()
    }

    /// Wire the retrieval pipeline from `[retrieval]`. `llm` serves query
    /// compression and dynamic routing; it is only called when those stages
    /// are enabled.
    pub fn build_augmentor(
        &self,
        llm: Arc<dyn LlmClient>,
    ) -> recall_common::Result<RetrievalAugmentor> {
        let rc = &self.retrieval;
        let client = Arc::new(LongTermMemoryClient::new(
            self.memory_server_url()?,
            self.memory_timeout(),
        )?);

        let mut user_memory = UserMemoryRetriever::new(client.clone(), rc.search_limit);
        if let Some(ref namespace) = rc.user_memory_namespace {
            user_memory = user_memory.with_namespace(namespace);
        }
        let user_memory: Arc<dyn ContentRetriever> = Arc::new(user_memory);
        let knowledge_base: Arc<dyn ContentRetriever> = Arc::new(KnowledgeBaseRetriever::new(
            client,
            &rc.knowledge_base_namespace,
            rc.search_limit,
        ));

        let router: Arc<dyn QueryRouter> = match rc.router {
            RouterKind::Static => Arc::new(StaticRouter::new(vec![user_memory, knowledge_base])?),
            RouterKind::Dynamic => Arc::new(
                LanguageModelRouter::builder()
                    .llm(llm.clone())
                    .retriever(user_memory, &rc.user_memory_description)
                    .retriever(knowledge_base, &rc.knowledge_base_description)
                    .fallback(rc.fallback)
                    .build()?,
            ),
        };

        let aggregator: Arc<dyn ContentAggregator> = match rc.rerank {
            Some(ref rerank) => {
                let scorer = HttpScoringModel::new(
                    &rerank.base_url,
                    rerank.model.clone(),
                    Duration::from_millis(rerank.timeout_ms),
                )?;
                let mut aggregator =
                    RerankingAggregator::new(Arc::new(scorer)).with_min_score(rerank.min_score);
                if let Some(max) = rerank.max_results {
                    aggregator = aggregator.with_max_results(max);
                }
                Arc::new(aggregator)
            }
            None => Arc::new(ConcatenatingAggregator),
        };

        let template = match rc.prompt_template {
            Some(ref template) => PromptTemplate::new(template.clone())?,
            None => PromptTemplate::default(),
        };

        let mut builder = RetrievalAugmentor::builder()
            .router(router)
            .aggregator(aggregator)
            .injector(Arc::new(DefaultContentInjector::new(template)));
        if rc.compress_query {
            builder = builder.transformer(Arc::new(CompressingQueryTransformer::new(llm)));
        }

        info!(
            router = ?rc.router,
            compress_query = rc.compress_query,
            rerank = rc.rerank.is_some(),
            "Retrieval augmentor configured"
        );
        builder.build()
    }
}
