//! Child process plumbing shared by the concrete adapters
//!
//! Both backends follow the same pipeline: launch the CLI with stdout
//! piped, split stdout on newlines, parse each nonempty trimmed line as
//! JSON (silently dropping malformed lines), and hand the parsed record to
//! a dialect-specific mapper. The pump terminates the child when the
//! stream finishes or the consumer goes away: SIGTERM to the process
//! group, then SIGKILL after a grace period.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::adapter::{AgentStream, InteractiveOptions, LlmSessionError};
use crate::events::AgentEvent;

/// Grace period between SIGTERM and SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Channel depth between the pump and the consumer
const STREAM_BUFFER: usize = 64;

/// What a parsed record means for the stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    /// Keep reading
    Continue,
    /// Natural end of the run
    Finish,
    /// The agent reported a terminal error
    Fail(String),
}

/// Events plus stream control derived from one NDJSON record
#[derive(Clone, Debug, Default)]
pub(crate) struct ParsedLine {
    pub events: Vec<AgentEvent>,
    pub outcome: Option<LineOutcome>,
}

impl ParsedLine {
    pub fn events(events: Vec<AgentEvent>) -> Self {
        Self {
            events,
            outcome: None,
        }
    }

    pub fn finish(events: Vec<AgentEvent>) -> Self {
        Self {
            events,
            outcome: Some(LineOutcome::Finish),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            outcome: Some(LineOutcome::Fail(message.into())),
        }
    }

    pub fn skip() -> Self {
        Self::default()
    }
}

/// Spawn a streaming agent child and pump its stdout through `parse`
pub(crate) fn spawn_streaming(
    mut command: Command,
    parse: impl Fn(&serde_json::Value) -> ParsedLine + Send + 'static,
) -> Result<AgentStream, LlmSessionError> {
    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    command.kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command
        .spawn()
        .map_err(|e| LlmSessionError::new(format!("failed to spawn agent: {e}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| LlmSessionError::new("agent stdout not captured"))?;

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        pump(child, stdout, parse, tx).await;
    });

    Ok(AgentStream::from_channel(rx))
}

async fn pump(
    mut child: Child,
    stdout: tokio::process::ChildStdout,
    parse: impl Fn(&serde_json::Value) -> ParsedLine,
    tx: mpsc::Sender<Result<AgentEvent, LlmSessionError>>,
) {
    let mut lines = BufReader::new(stdout).lines();

    'read: loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            // Consumer dropped the stream: stop reading and kill the child.
            _ = tx.closed() => {
                debug!("agent stream dropped, terminating child");
                break 'read;
            }
        };

        match line {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Ok(record) = serde_json::from_str::<serde_json::Value>(line) else {
                    debug!(len = line.len(), "dropping malformed agent output line");
                    continue;
                };

                let parsed = parse(&record);
                for event in parsed.events {
                    if tx.send(Ok(event)).await.is_err() {
                        break 'read;
                    }
                }
                match parsed.outcome {
                    None | Some(LineOutcome::Continue) => {}
                    Some(LineOutcome::Finish) => {
                        debug!("agent stream finished");
                        break 'read;
                    }
                    Some(LineOutcome::Fail(message)) => {
                        let _ = tx.send(Err(LlmSessionError::new(message))).await;
                        break 'read;
                    }
                }
            }
            Ok(None) => {
                debug!("agent stdout closed");
                break 'read;
            }
            Err(e) => {
                let _ = tx
                    .send(Err(LlmSessionError::new(format!("failed to read agent stdout: {e}"))))
                    .await;
                break 'read;
            }
        }
    }

    terminate(&mut child).await;
}

/// Stop the child: SIGTERM to its process group, wait, escalate to SIGKILL
async fn terminate(child: &mut Child) {
    if let Ok(Some(status)) = child.try_wait() {
        debug!(?status, "agent already exited");
        return;
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            // Negative pid targets the process group created at spawn.
            let _ = kill(Pid::from_raw(-(pid as i32)), Signal::SIGTERM);
        }

        match tokio::time::timeout(KILL_GRACE, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("agent ignored SIGTERM, sending SIGKILL");
                if let Some(pid) = child.id() {
                    let _ = kill(Pid::from_raw(-(pid as i32)), Signal::SIGKILL);
                }
                let _ = child.wait().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

/// Run an agent attached to the controlling terminal
pub(crate) async fn run_interactive(
    mut command: Command,
    opts: &InteractiveOptions,
) -> Result<i32, LlmSessionError> {
    command
        .current_dir(&opts.cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let mut child = command
        .spawn()
        .map_err(|e| LlmSessionError::new(format!("failed to spawn agent: {e}")))?;

    let status = child
        .wait()
        .await
        .map_err(|e| LlmSessionError::new(format!("failed to wait for agent: {e}")))?;

    Ok(status.code().unwrap_or(-1))
}
