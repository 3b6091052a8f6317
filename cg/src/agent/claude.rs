//! Claude Code agent adapter (document-centric stream-json dialect)
//!
//! Invocation:
//! `claude -p --output-format stream-json --verbose --include-partial-messages
//!  --disallowedTools AskUserQuestion [--dangerously-skip-permissions]
//!  [--append-system-prompt <text>] [--session-id <id>] [--resume <id>] -- <prompt>`
//!
//! Records carry `type ∈ {system, assistant, user, result, stream_event}`.
//! Assistant/user records wrap an Anthropic-style message whose content
//! blocks map to individual events.

use async_trait::async_trait;
use tokio::process::Command;

use super::adapter::{AgentAdapter, AgentStream, InteractiveOptions, LlmSessionError, SpawnOptions, trace_spawn};
use super::process::{ParsedLine, run_interactive, spawn_streaming};
use crate::events::AgentEvent;

/// Agent adapter for the Claude Code CLI
#[derive(Clone, Debug)]
pub struct ClaudeAdapter {
    binary: String,
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ClaudeAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn streaming_command(&self, opts: &SpawnOptions) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .current_dir(&opts.cwd)
            .arg("-p")
            .args(["--output-format", "stream-json"])
            .arg("--verbose")
            .arg("--include-partial-messages")
            .args(["--disallowedTools", "AskUserQuestion"]);

        if opts.dangerously_skip_permissions {
            command.arg("--dangerously-skip-permissions");
        }
        if let Some(system_prompt) = &opts.system_prompt {
            command.args(["--append-system-prompt", system_prompt]);
        }
        if let Some(session_id) = &opts.session_id {
            command.args(["--session-id", session_id]);
        }
        if let Some(resume) = &opts.resume_session_id {
            command.args(["--resume", resume]);
        }

        command.arg("--").arg(&opts.prompt);
        command
    }
}

#[async_trait]
impl AgentAdapter for ClaudeAdapter {
    async fn spawn(&self, opts: SpawnOptions) -> Result<AgentStream, LlmSessionError> {
        trace_spawn("claude", &opts);
        spawn_streaming(self.streaming_command(&opts), parse_record)
    }

    async fn interactive(&self, opts: InteractiveOptions) -> Result<i32, LlmSessionError> {
        let mut command = Command::new(&self.binary);
        if opts.dangerously_skip_permissions {
            command.arg("--dangerously-skip-permissions");
        }
        if let Some(system_prompt) = &opts.system_prompt {
            command.args(["--append-system-prompt", system_prompt]);
        }
        run_interactive(command, &opts).await
    }
}

/// Map one stream-json record to agent events and stream control
fn parse_record(record: &serde_json::Value) -> ParsedLine {
    match record.get("type").and_then(|v| v.as_str()) {
        Some("system") => {
            let content = record
                .get("subtype")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            ParsedLine::events(vec![AgentEvent::SystemMessage { content }])
        }
        Some("assistant") => ParsedLine::events(message_blocks(record, true)),
        Some("user") => ParsedLine::events(message_blocks(record, false)),
        Some("result") => match record.get("subtype").and_then(|v| v.as_str()) {
            Some("success") => ParsedLine::finish(vec![]),
            Some(subtype) => {
                let message = record
                    .get("error")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
                    .unwrap_or_else(|| format!("agent run ended with {subtype}"));
                ParsedLine::fail(message)
            }
            None => ParsedLine::fail("agent result record without subtype"),
        },
        Some("stream_event") => ParsedLine::events(vec![AgentEvent::ping_now()]),
        _ => ParsedLine::skip(),
    }
}

/// Flatten `message.content[]` blocks into events
fn message_blocks(record: &serde_json::Value, assistant: bool) -> Vec<AgentEvent> {
    let Some(blocks) = record
        .pointer("/message/content")
        .and_then(|v| v.as_array())
    else {
        return Vec::new();
    };

    let mut events = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("text") => {
                let content = block.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                events.push(if assistant {
                    AgentEvent::AgentMessage { content }
                } else {
                    AgentEvent::UserMessage { content }
                });
            }
            Some("tool_use") if assistant => {
                events.push(AgentEvent::ToolCall {
                    name: block.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    input: block.get("input").cloned().unwrap_or(serde_json::Value::Null),
                });
            }
            Some("tool_result") if !assistant => {
                events.push(AgentEvent::ToolResult {
                    name: block
                        .get("name")
                        .or_else(|| block.get("tool_use_id"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    output: tool_result_text(block),
                    is_error: block.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false),
                });
            }
            _ => {}
        }
    }
    events
}

/// A tool result's `content` is a string or a list of `{text}` blocks
fn tool_result_text(block: &serde_json::Value) -> String {
    match block.get("content") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}
