//! Retrieval queries.

use recall_common::ChatTurn;

/// What retrievers search for, plus the identity and conversation it came
/// from. Identity is explicit per request; nothing is process-global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub user_id: String,
    /// Earlier turns of the conversation, oldest first. Used to rewrite
    /// follow-up questions into standalone ones.
    pub history: Vec<ChatTurn>,
}

impl Query {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    /// Same identity and history, different text.
    pub fn rewritten(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: self.user_id.clone(),
            history: self.history.clone(),
        }
    }
}
