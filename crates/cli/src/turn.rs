//! One non-streaming chat turn with working memory and retrieval.

use anyhow::Context;
use recall_common::ChatTurn;
use recall_llm::{ChatMessage, LlmClient, LlmRequest};
use recall_memory::WorkingMemoryChat;
use recall_rag::{Query, RetrievalAugmentor};
use tracing::{info, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the provided context when it is relevant.";

/// Record the user's message, build context from long-term memory, answer,
/// and record the answer. A working-memory write that does not persist is
/// logged and the turn continues; retrieval or model failures abort it.
pub async fn run_turn(
    chat: &mut WorkingMemoryChat,
    augmentor: &RetrievalAugmentor,
    llm: &dyn LlmClient,
    user_id: &str,
    system_prompt: &str,
    message: &str,
) -> anyhow::Result<String> {
    let history: Vec<ChatTurn> = chat.read().to_vec();
    if !chat.append(ChatTurn::user(message)).await {
        warn!(session_id = %chat.id(), "User turn was not persisted");
    }

    let query = Query::new(message, user_id).with_history(history.clone());
    let augmented = augmentor
        .augment(&query, message)
        .await
        .context("Failed to build context for the message")?;

    let mut messages: Vec<ChatMessage> =
        history.iter().filter_map(ChatMessage::from_turn).collect();
    messages.push(ChatMessage::user(augmented.prompt));
    let request = LlmRequest {
        system_prompt: Some(system_prompt.to_string()),
        messages,
        ..Default::default()
    };

    let response = llm.complete(request).await.context("Model call failed")?;
    info!(
        session_id = %chat.id(),
        contents = augmented.contents.len(),
        model = %response.model,
        "Answered chat turn"
    );

    if !chat.append(ChatTurn::assistant(response.content.clone())).await {
        warn!(session_id = %chat.id(), "Assistant turn was not persisted");
    }
    Ok(response.content)
}
