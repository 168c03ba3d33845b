//! Error types for the recall memory subsystem.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecallError {
    /// The remote memory service was unreachable, timed out, or answered non-2xx.
    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// A content retriever's underlying search failed.
    #[error("Retrieval error in '{retriever}': {message}")]
    Retrieval { retriever: String, message: String },

    /// A language-model or scoring-model call failed.
    #[error("Model error{}: {message}", status_suffix(.status))]
    Model {
        status: Option<u16>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl RecallError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn transport_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            status: None,
            message: message.into(),
        }
    }

    pub fn model_status(status: u16, message: impl Into<String>) -> Self {
        Self::Model {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn retrieval(retriever: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Retrieval {
            retriever: retriever.into(),
            message: message.into(),
        }
    }

    /// HTTP status attached to the failure, if the remote side answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } | Self::Model { status, .. } => *status,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecallError>;
