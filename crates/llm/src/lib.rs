//! Model clients for the recall memory subsystem.
//!
//! Two seams live here: [`LlmClient`] for chat completions (query compression,
//! routing classification, answering) and [`ScoringModel`] for reranking.

pub mod client;
pub mod config;
pub mod openai;
pub mod retry;
pub mod scoring;

pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
pub use config::{LlmConfig, SemaphoredClient, build_llm_client};
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient};
pub use scoring::{HttpScoringModel, ScoringModel};
