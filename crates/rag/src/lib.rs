//! Long-term memory retrieval augmentation.
//!
//! One request flows through the stages in order, each a swappable strategy
//! object chosen at composition time:
//!
//! ```text
//! Query ─▶ QueryTransformer? ─▶ QueryRouter ─▶ ContentRetriever* (concurrent)
//!                                                   │
//!          prompt ◀─ ContentInjector ◀─ ContentAggregator
//! ```
//!
//! [`RecallConfig`] wires the stages from TOML.

pub mod aggregator;
pub mod augmentor;
pub mod config;
pub mod content;
pub mod injector;
pub mod query;
pub mod retriever;
pub mod router;
pub mod transformer;

pub use aggregator::{ConcatenatingAggregator, ContentAggregator, RerankingAggregator};
pub use augmentor::{AugmentationResult, RetrievalAugmentor, RetrievalAugmentorBuilder};
pub use config::{RecallConfig, RerankConfig, RetrievalConfig, RouterKind};
pub use content::Content;
pub use injector::{ContentInjector, DefaultContentInjector, PromptTemplate};
pub use query::Query;
pub use retriever::{
    ContentRetriever, ContentStream, KNOWLEDGE_BASE_ID, KnowledgeBaseRetriever, USER_MEMORY_ID,
    UserMemoryRetriever,
};
pub use router::{FallbackStrategy, LanguageModelRouter, QueryRouter, StaticRouter};
pub use transformer::{CompressingQueryTransformer, QueryTransformer};
