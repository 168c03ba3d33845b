//! Chat turns as seen by working memory.

use serde::{Deserialize, Serialize};

/// Role of a chat turn.
///
/// `Unknown` carries whatever the remote side sent so it can be logged; it is
/// never admitted by a memory policy and never written back.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Unknown(String),
}

impl Role {
    /// Parse a wire role. `"ai"` is accepted as an alias for `assistant`.
    pub fn from_wire(role: &str) -> Self {
        match role.to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "assistant" | "ai" => Self::Assistant,
            "system" => Self::System,
            "tool" => Self::Tool,
            _ => Self::Unknown(role.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
            Self::Unknown(raw) => raw,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn tool(text: impl Into<String>) -> Self {
        Self::new(Role::Tool, text)
    }
}

/// `{role, content}` pair exchanged with the memory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl From<&ChatTurn> for WireMessage {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            role: turn.role.as_wire().to_string(),
            content: turn.text.clone(),
        }
    }
}

impl From<WireMessage> for ChatTurn {
    fn from(message: WireMessage) -> Self {
        Self {
            role: Role::from_wire(&message.role),
            text: message.content,
        }
    }
}
