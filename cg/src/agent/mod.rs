//! Agent backends
//!
//! The loop engine talks to an abstract [`AgentAdapter`]; the concrete
//! backends wrap the Claude Code and Codex CLIs, whose NDJSON dialects
//! differ but share the same child-process pipeline.

use std::sync::Arc;

use tracing::debug;

mod adapter;
mod claude;
mod codex;
mod process;

pub use adapter::{AgentAdapter, AgentStream, InteractiveOptions, LlmSessionError, SpawnOptions};
pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;

/// Selectable agent backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AgentKind {
    #[default]
    Claude,
    Codex,
}

impl AgentKind {
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(AgentKind::Claude),
            "codex" => Ok(AgentKind::Codex),
            other => Err(format!("unknown agent '{other}'. Supported: claude, codex")),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Create the adapter for the selected backend
pub fn create_adapter(kind: AgentKind) -> Arc<dyn AgentAdapter> {
    debug!(%kind, "create_adapter: called");
    match kind {
        AgentKind::Claude => Arc::new(ClaudeAdapter::default()),
        AgentKind::Codex => Arc::new(CodexAdapter::default()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_kind_parsing() {
        assert_eq!("claude".parse::<AgentKind>().unwrap(), AgentKind::Claude);
        assert_eq!("codex".parse::<AgentKind>().unwrap(), AgentKind::Codex);
        assert!("gpt".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_factory_returns_adapter_per_kind() {
        // Smoke check: both arms construct.
        let _ = create_adapter(AgentKind::Claude);
        let _ = create_adapter(AgentKind::Codex);
    }
}
