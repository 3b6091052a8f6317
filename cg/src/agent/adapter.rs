//! Agent adapter seam
//!
//! An agent backend is an opaque CLI spawned as a child process. `spawn`
//! yields a finite stream of typed events decoded from its NDJSON stdout;
//! `interactive` hands the controlling terminal to the agent and resolves
//! to its exit code. Each call is independent - the loop deliberately
//! starts every phase with a fresh context window.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::AgentEvent;

/// Failure of an agent session
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("agent session failed: {message}")]
pub struct LlmSessionError {
    pub message: String,
}

impl LlmSessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Options for a streaming agent run
#[derive(Clone, Debug, Default)]
pub struct SpawnOptions {
    /// Working directory the agent operates in
    pub cwd: PathBuf,
    /// One-line user prompt identifying the task
    pub prompt: String,
    /// System prompt appended to the agent's own
    pub system_prompt: Option<String>,
    /// Let the agent act without permission prompts
    pub dangerously_skip_permissions: bool,
    /// Pin the agent CLI's own session id
    pub session_id: Option<String>,
    /// Resume a previous agent CLI session
    pub resume_session_id: Option<String>,
}

/// Options for an interactive agent run
#[derive(Clone, Debug, Default)]
pub struct InteractiveOptions {
    pub cwd: PathBuf,
    pub system_prompt: Option<String>,
    pub dangerously_skip_permissions: bool,
}

/// Finite event sequence of one agent run
///
/// Backed by a channel fed by the stdout pump. Dropping the stream signals
/// the pump, which terminates the child (SIGTERM, then SIGKILL after a
/// grace period) - cancellation is just dropping.
pub struct AgentStream {
    rx: mpsc::Receiver<Result<AgentEvent, LlmSessionError>>,
}

impl AgentStream {
    /// Wrap a pump-fed channel
    pub(crate) fn from_channel(rx: mpsc::Receiver<Result<AgentEvent, LlmSessionError>>) -> Self {
        Self { rx }
    }

    /// Build a stream from pre-recorded items (for custom adapters and tests)
    pub fn scripted(items: Vec<Result<AgentEvent, LlmSessionError>>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity covers every item, so this cannot fail.
            let _ = tx.try_send(item);
        }
        Self { rx }
    }

    /// Next event, or None when the run ended
    pub async fn next(&mut self) -> Option<Result<AgentEvent, LlmSessionError>> {
        self.rx.recv().await
    }

    /// Drain the remaining events (test helper)
    pub async fn collect(mut self) -> Vec<Result<AgentEvent, LlmSessionError>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item);
        }
        out
    }
}

/// An LLM agent CLI backend
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Spawn the agent and stream its decoded output
    async fn spawn(&self, opts: SpawnOptions) -> Result<AgentStream, LlmSessionError>;

    /// Run the agent attached to the controlling terminal
    async fn interactive(&self, opts: InteractiveOptions) -> Result<i32, LlmSessionError>;
}

/// Log a spawn at debug level (shared by the concrete adapters)
pub(crate) fn trace_spawn(backend: &'static str, opts: &SpawnOptions) {
    debug!(
        backend,
        cwd = %opts.cwd.display(),
        prompt_len = opts.prompt.len(),
        has_system_prompt = opts.system_prompt.is_some(),
        skip_permissions = opts.dangerously_skip_permissions,
        "spawning agent"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_stream_yields_in_order() {
        let mut stream = AgentStream::scripted(vec![
            Ok(AgentEvent::AgentMessage { content: "a".into() }),
            Ok(AgentEvent::AgentMessage { content: "b".into() }),
        ]);

        assert_eq!(
            stream.next().await,
            Some(Ok(AgentEvent::AgentMessage { content: "a".into() }))
        );
        assert_eq!(
            stream.next().await,
            Some(Ok(AgentEvent::AgentMessage { content: "b".into() }))
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_scripted_stream_carries_errors() {
        let mut stream = AgentStream::scripted(vec![Err(LlmSessionError::new("boom"))]);
        assert_eq!(stream.next().await, Some(Err(LlmSessionError::new("boom"))));
        assert_eq!(stream.next().await, None);
    }
}
