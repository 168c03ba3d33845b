//! Memory policy: which turn roles working memory keeps, and for how long.

use recall_common::{ChatTurn, RecallError, Result, Role};

pub const DEFAULT_TTL_SECONDS: u64 = 300;
pub const DEFAULT_NAMESPACE: &str = "short-term-memory";

/// Immutable per-store policy. Build one with [`MemoryPolicy::builder`];
/// changing a policy means building a new store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPolicy {
    ttl_seconds: u64,
    include_system: bool,
    include_assistant: bool,
    include_tool: bool,
    namespace: String,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            include_system: false,
            include_assistant: false,
            include_tool: false,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl MemoryPolicy {
    pub fn builder() -> MemoryPolicyBuilder {
        MemoryPolicyBuilder::default()
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn include_system(&self) -> bool {
        self.include_system
    }

    pub fn include_assistant(&self) -> bool {
        self.include_assistant
    }

    pub fn include_tool(&self) -> bool {
        self.include_tool
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// User turns are always kept; unknown roles never are.
    pub fn admits(&self, role: &Role) -> bool {
        match role {
            Role::User => true,
            Role::Assistant => self.include_assistant,
            Role::System => self.include_system,
            Role::Tool => self.include_tool,
            Role::Unknown(_) => false,
        }
    }

    /// The order-preserving subset of `turns` this policy admits.
    pub fn filter(&self, turns: &[ChatTurn]) -> Vec<ChatTurn> {
        turns
            .iter()
            .filter(|turn| self.admits(&turn.role))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryPolicyBuilder {
    ttl_seconds: Option<u64>,
    include_system: Option<bool>,
    include_assistant: Option<bool>,
    include_tool: Option<bool>,
    namespace: Option<String>,
}

impl MemoryPolicyBuilder {
    pub fn ttl_seconds(mut self, value: u64) -> Self {
        self.ttl_seconds = Some(value);
        self
    }

    pub fn include_system(mut self, value: bool) -> Self {
        self.include_system = Some(value);
        self
    }

    pub fn include_assistant(mut self, value: bool) -> Self {
        self.include_assistant = Some(value);
        self
    }

    pub fn include_tool(mut self, value: bool) -> Self {
        self.include_tool = Some(value);
        self
    }

    pub fn namespace(mut self, value: impl Into<String>) -> Self {
        self.namespace = Some(value.into());
        self
    }

    pub fn build(self) -> Result<MemoryPolicy> {
        let defaults = MemoryPolicy::default();

        let ttl_seconds = self.ttl_seconds.unwrap_or(defaults.ttl_seconds);
        if ttl_seconds == 0 {
            return Err(RecallError::Config(
                "ttl_seconds must be greater than zero".into(),
            ));
        }

        let namespace = self.namespace.unwrap_or(defaults.namespace);
        if namespace.trim().is_empty() {
            return Err(RecallError::Config("namespace must not be empty".into()));
        }

        Ok(MemoryPolicy {
            ttl_seconds,
            include_system: self.include_system.unwrap_or(defaults.include_system),
            include_assistant: self.include_assistant.unwrap_or(defaults.include_assistant),
            include_tool: self.include_tool.unwrap_or(defaults.include_tool),
            namespace,
        })
    }
}
