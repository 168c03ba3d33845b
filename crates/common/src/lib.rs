//! Common types shared across the recall crates.
//!
//! Holds the error taxonomy every layer reports through and the chat-turn
//! model that working memory persists.

pub mod error;
pub mod turn;

pub use error::{RecallError, Result};
pub use turn::{ChatTurn, Role, WireMessage};
