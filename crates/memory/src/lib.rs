//! Memory layers for the recall subsystem.
//!
//! - **Working memory**: a session's recent turns, held by a remote memory
//!   server under a TTL lease and filtered by a [`MemoryPolicy`].
//! - **Long-term memory**: durable facts on the same server, reached through
//!   [`LongTermMemoryClient`] search.
//!
//! ```text
//!  agent loop ──append/read──▶ WorkingMemoryChat ──full replace──▶ ChatMemoryStore
//!                                                                  ├─ WorkingMemoryStore (HTTP)
//!                                                                  └─ InMemoryChatStore
//! ```

pub mod chat;
pub mod long_term;
pub mod policy;
pub mod store;
pub mod working;

pub use chat::WorkingMemoryChat;
pub use long_term::{LongTermMemoryClient, MemoryRecord, SearchRequest};
pub use policy::{MemoryPolicy, MemoryPolicyBuilder};
pub use store::{ChatMemoryStore, InMemoryChatStore};
pub use working::{RetentionStrategy, WorkingMemoryStore, WorkingMemoryStoreBuilder};
