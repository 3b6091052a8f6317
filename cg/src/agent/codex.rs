//! Codex agent adapter (event-centric exec dialect)
//!
//! Invocation:
//! `codex exec --json [--dangerously-bypass-approvals-and-sandbox]
//!  [--config developer_instructions=<text>] -- <prompt>`
//!
//! Records carry `type ∈ {thread.started, item.started, item.completed,
//! turn.completed, turn.failed}`. Every incoming line doubles as a
//! heartbeat, so each record emits a `Ping` ahead of its mapped events.

use async_trait::async_trait;
use tokio::process::Command;

use super::adapter::{AgentAdapter, AgentStream, InteractiveOptions, LlmSessionError, SpawnOptions, trace_spawn};
use super::process::{ParsedLine, run_interactive, spawn_streaming};
use crate::events::AgentEvent;

/// Agent adapter for the Codex CLI
#[derive(Clone, Debug)]
pub struct CodexAdapter {
    binary: String,
}

impl Default for CodexAdapter {
    fn default() -> Self {
        Self::new("codex")
    }
}

impl CodexAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn streaming_command(&self, opts: &SpawnOptions) -> Command {
        let mut command = Command::new(&self.binary);
        command.current_dir(&opts.cwd).arg("exec").arg("--json");

        if opts.dangerously_skip_permissions {
            command.arg("--dangerously-bypass-approvals-and-sandbox");
        }
        if let Some(system_prompt) = &opts.system_prompt {
            command.args(["--config", &format!("developer_instructions={system_prompt}")]);
        }

        command.arg("--").arg(&opts.prompt);
        command
    }
}

#[async_trait]
impl AgentAdapter for CodexAdapter {
    async fn spawn(&self, opts: SpawnOptions) -> Result<AgentStream, LlmSessionError> {
        trace_spawn("codex", &opts);
        spawn_streaming(self.streaming_command(&opts), parse_record)
    }

    async fn interactive(&self, opts: InteractiveOptions) -> Result<i32, LlmSessionError> {
        let mut command = Command::new(&self.binary);
        if opts.dangerously_skip_permissions {
            command.arg("--dangerously-bypass-approvals-and-sandbox");
        }
        if let Some(system_prompt) = &opts.system_prompt {
            command.args(["--config", &format!("developer_instructions={system_prompt}")]);
        }
        run_interactive(command, &opts).await
    }
}

/// Map one exec-json record to agent events and stream control
fn parse_record(record: &serde_json::Value) -> ParsedLine {
    // Every line is a liveness signal regardless of its payload.
    let mut events = vec![AgentEvent::ping_now()];

    match record.get("type").and_then(|v| v.as_str()) {
        Some("item.started") => {
            if item_type(record) == Some("function_call") {
                events.push(AgentEvent::ToolCall {
                    name: item_str(record, "name").unwrap_or_default(),
                    input: record
                        .pointer("/item/arguments")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null),
                });
            }
            ParsedLine::events(events)
        }
        Some("item.completed") => {
            match item_type(record) {
                Some("function_call_output") => {
                    let is_error = item_str(record, "status").as_deref() == Some("error");
                    events.push(AgentEvent::ToolResult {
                        name: item_str(record, "name").unwrap_or_default(),
                        output: item_str(record, "output").unwrap_or_default(),
                        is_error,
                    });
                }
                Some("message") => {
                    events.extend(message_texts(record).into_iter().map(|content| AgentEvent::AgentMessage { content }));
                }
                _ => {}
            }
            ParsedLine::events(events)
        }
        Some("turn.completed") => ParsedLine::finish(events),
        Some("turn.failed") => {
            let message = record
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
                .unwrap_or_else(|| "agent turn failed".to_string());
            ParsedLine {
                events,
                outcome: Some(super::process::LineOutcome::Fail(message)),
            }
        }
        // thread.started and anything unrecognized: heartbeat only.
        _ => ParsedLine::events(events),
    }
}

fn item_type(record: &serde_json::Value) -> Option<&str> {
    record.pointer("/item/type").and_then(|v| v.as_str())
}

fn item_str(record: &serde_json::Value, key: &str) -> Option<String> {
    record
        .pointer(&format!("/item/{key}"))
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

/// Text content blocks of a completed message item
fn message_texts(record: &serde_json::Value) -> Vec<String> {
    if let Some(parts) = record.pointer("/item/content").and_then(|v| v.as_array()) {
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|v| v.as_str()))
            .map(ToString::to_string)
            .collect()
    } else if let Some(text) = record.pointer("/item/text").and_then(|v| v.as_str()) {
        vec![text.to_string()]
    } else {
        Vec::new()
    }
}
