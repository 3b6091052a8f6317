//! Event types for cuggino activity streaming
//!
//! Four disjoint event families cover all observable activity:
//! - Agent: raw output of a spawned LLM CLI (messages, tool traffic, pings)
//! - Marker: structured outcomes extracted from agent text
//! - Loop: phase transitions and command output of one loop run
//! - Watch: supervisor activity across the backlog and spec-issue queues

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events produced by a spawned agent process
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// System-role message emitted by the agent CLI
    SystemMessage { content: String },
    /// Assistant text block
    AgentMessage { content: String },
    /// User-role text block (tool results excluded)
    UserMessage { content: String },
    /// The agent invoked a tool
    ToolCall { name: String, input: serde_json::Value },
    /// A tool returned to the agent
    ToolResult {
        name: String,
        output: String,
        is_error: bool,
    },
    /// Heartbeat showing the agent is still alive
    Ping { ts: DateTime<Utc> },
}

impl AgentEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::SystemMessage { .. } => "SystemMessage",
            AgentEvent::AgentMessage { .. } => "AgentMessage",
            AgentEvent::UserMessage { .. } => "UserMessage",
            AgentEvent::ToolCall { .. } => "ToolCall",
            AgentEvent::ToolResult { .. } => "ToolResult",
            AgentEvent::Ping { .. } => "Ping",
        }
    }

    /// Heartbeat with the current wall-clock time
    pub fn ping_now() -> Self {
        AgentEvent::Ping { ts: Utc::now() }
    }
}

/// Structured outcomes extracted from agent text output
///
/// Each variant corresponds to one wire tag (`<NOTE>`, `<SPEC_ISSUE>`, ...).
/// The terminal subset ends a loop phase when observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MarkerEvent {
    /// Free-form remark, allowed inline during implementation
    Note { content: String },
    /// The agent hit an ambiguity it cannot resolve
    SpecIssue { content: String },
    /// A work increment landed, more remains
    Progress { content: String },
    /// Implementation finished
    Done { content: String },
    /// Review passed
    Approved { content: String },
    /// Review failed with requested changes
    RequestChanges { content: String },
    /// Planning finished
    PlanComplete { content: String },
    /// Audit finding for later human review
    ToBeDiscussed { content: String },
}

impl MarkerEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            MarkerEvent::Note { .. } => "Note",
            MarkerEvent::SpecIssue { .. } => "SpecIssue",
            MarkerEvent::Progress { .. } => "Progress",
            MarkerEvent::Done { .. } => "Done",
            MarkerEvent::Approved { .. } => "Approved",
            MarkerEvent::RequestChanges { .. } => "RequestChanges",
            MarkerEvent::PlanComplete { .. } => "PlanComplete",
            MarkerEvent::ToBeDiscussed { .. } => "ToBeDiscussed",
        }
    }

    /// The wire tag this marker is written as in agent output
    pub fn tag(&self) -> &'static str {
        match self {
            MarkerEvent::Note { .. } => "NOTE",
            MarkerEvent::SpecIssue { .. } => "SPEC_ISSUE",
            MarkerEvent::Progress { .. } => "PROGRESS",
            MarkerEvent::Done { .. } => "DONE",
            MarkerEvent::Approved { .. } => "APPROVED",
            MarkerEvent::RequestChanges { .. } => "REQUEST_CHANGES",
            MarkerEvent::PlanComplete { .. } => "PLAN_COMPLETE",
            MarkerEvent::ToBeDiscussed { .. } => "TO_BE_DISCUSSED",
        }
    }

    /// The marker body
    pub fn content(&self) -> &str {
        match self {
            MarkerEvent::Note { content }
            | MarkerEvent::SpecIssue { content }
            | MarkerEvent::Progress { content }
            | MarkerEvent::Done { content }
            | MarkerEvent::Approved { content }
            | MarkerEvent::RequestChanges { content }
            | MarkerEvent::PlanComplete { content }
            | MarkerEvent::ToBeDiscussed { content } => content,
        }
    }

    /// Whether observing this marker ends the current phase
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MarkerEvent::Note { .. } | MarkerEvent::ToBeDiscussed { .. })
    }
}

/// Phase transitions and command output of one loop run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LoopEvent {
    /// A Plan -> Implement -> Review cycle begins
    IterationStart { iteration: u32, max_iterations: u32 },
    /// Planning phase begins
    PlanningStart { iteration: u32 },
    /// Implementing phase (or an inner progress pass) begins
    ImplementingStart { iteration: u32 },
    /// Reviewing phase begins
    ReviewingStart { iteration: u32 },
    /// Output of the one-time setup command
    SetupCommandOutput {
        iteration: u32,
        output: String,
        exit_code: i32,
        file: String,
    },
    /// Output of the check command, run before each agent phase pass
    CheckCommandOutput {
        iteration: u32,
        output: String,
        exit_code: i32,
        file: String,
    },
    /// Auto-commit landed
    CommitPerformed {
        iteration: u32,
        commit_hash: String,
        message: String,
    },
    /// Auto-commit failed (never fatal)
    CommitFailed { iteration: u32, message: String },
    /// Auto-push landed
    PushPerformed {
        iteration: u32,
        remote: String,
        branch: String,
    },
    /// Auto-push failed (never fatal)
    PushFailed { iteration: u32, message: String },
    /// Terminal: reviewer approved the work
    LoopApproved { iteration: u32 },
    /// Terminal: a spec issue was filed and the run stopped
    LoopSpecIssue {
        iteration: u32,
        content: String,
        filename: String,
    },
    /// Terminal: the iteration budget ran out
    LoopMaxIterations { iteration: u32, max_iterations: u32 },
}

impl LoopEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            LoopEvent::IterationStart { .. } => "IterationStart",
            LoopEvent::PlanningStart { .. } => "PlanningStart",
            LoopEvent::ImplementingStart { .. } => "ImplementingStart",
            LoopEvent::ReviewingStart { .. } => "ReviewingStart",
            LoopEvent::SetupCommandOutput { .. } => "SetupCommandOutput",
            LoopEvent::CheckCommandOutput { .. } => "CheckCommandOutput",
            LoopEvent::CommitPerformed { .. } => "CommitPerformed",
            LoopEvent::CommitFailed { .. } => "CommitFailed",
            LoopEvent::PushPerformed { .. } => "PushPerformed",
            LoopEvent::PushFailed { .. } => "PushFailed",
            LoopEvent::LoopApproved { .. } => "LoopApproved",
            LoopEvent::LoopSpecIssue { .. } => "LoopSpecIssue",
            LoopEvent::LoopMaxIterations { .. } => "LoopMaxIterations",
        }
    }

    /// Whether this event ends the loop run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopEvent::LoopApproved { .. }
                | LoopEvent::LoopSpecIssue { .. }
                | LoopEvent::LoopMaxIterations { .. }
        )
    }
}

/// Supervisor activity across the backlog and spec-issue queues
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WatchEvent {
    /// The backlog is empty; waiting for work
    BacklogWaiting,
    /// Open spec issues block the backlog; waiting for the human
    SpecIssueWaiting,
    /// A backlog item was picked and a loop run started
    ProcessingItem { filename: String },
    /// The item finished and was deleted
    ItemCompleted { filename: String },
    /// The item finished but was edited while running; kept on disk
    ItemRetained { filename: String },
    /// The idle-time audit agent began
    AuditStarted,
    /// The audit agent finished before work arrived
    AuditEnded,
    /// The audit agent was interrupted by incoming work
    AuditInterrupted,
    /// The audit agent filed a to-be-discussed note
    TbdItemFound { content: String, filename: String },
}

impl WatchEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            WatchEvent::BacklogWaiting => "BacklogWaiting",
            WatchEvent::SpecIssueWaiting => "SpecIssueWaiting",
            WatchEvent::ProcessingItem { .. } => "ProcessingItem",
            WatchEvent::ItemCompleted { .. } => "ItemCompleted",
            WatchEvent::ItemRetained { .. } => "ItemRetained",
            WatchEvent::AuditStarted => "AuditStarted",
            WatchEvent::AuditEnded => "AuditEnded",
            WatchEvent::AuditInterrupted => "AuditInterrupted",
            WatchEvent::TbdItemFound { .. } => "TbdItemFound",
        }
    }
}

/// Umbrella event carried on every cuggino output stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family")]
pub enum Event {
    Agent(AgentEvent),
    Marker(MarkerEvent),
    Loop(LoopEvent),
    Watch(WatchEvent),
}

impl Event {
    /// Get the event type name of the inner event
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Agent(e) => e.event_type(),
            Event::Marker(e) => e.event_type(),
            Event::Loop(e) => e.event_type(),
            Event::Watch(e) => e.event_type(),
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, Event::Agent(_))
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Event::Marker(_))
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Event::Loop(_))
    }

    pub fn is_watch(&self) -> bool {
        matches!(self, Event::Watch(_))
    }

    /// The terminal loop event inside, if any
    pub fn as_loop_terminal(&self) -> Option<&LoopEvent> {
        match self {
            Event::Loop(e) if e.is_terminal() => Some(e),
            _ => None,
        }
    }
}

impl From<AgentEvent> for Event {
    fn from(e: AgentEvent) -> Self {
        Event::Agent(e)
    }
}

impl From<MarkerEvent> for Event {
    fn from(e: MarkerEvent) -> Self {
        Event::Marker(e)
    }
}

impl From<LoopEvent> for Event {
    fn from(e: LoopEvent) -> Self {
        Event::Loop(e)
    }
}

impl From<WatchEvent> for Event {
    fn from(e: WatchEvent) -> Self {
        Event::Watch(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_terminal_subset() {
        let terminal = [
            MarkerEvent::SpecIssue { content: "x".into() },
            MarkerEvent::Progress { content: "x".into() },
            MarkerEvent::Done { content: "x".into() },
            MarkerEvent::Approved { content: "x".into() },
            MarkerEvent::RequestChanges { content: "x".into() },
            MarkerEvent::PlanComplete { content: "x".into() },
        ];
        for m in &terminal {
            assert!(m.is_terminal(), "{} should be terminal", m.event_type());
        }
        assert!(!MarkerEvent::Note { content: "x".into() }.is_terminal());
        assert!(!MarkerEvent::ToBeDiscussed { content: "x".into() }.is_terminal());
    }

    #[test]
    fn test_loop_terminal_subset() {
        assert!(LoopEvent::LoopApproved { iteration: 1 }.is_terminal());
        assert!(
            LoopEvent::LoopSpecIssue {
                iteration: 1,
                content: "x".into(),
                filename: "f.md".into(),
            }
            .is_terminal()
        );
        assert!(
            LoopEvent::LoopMaxIterations {
                iteration: 2,
                max_iterations: 2,
            }
            .is_terminal()
        );
        assert!(
            !LoopEvent::IterationStart {
                iteration: 1,
                max_iterations: 10,
            }
            .is_terminal()
        );
        assert!(!LoopEvent::PlanningStart { iteration: 1 }.is_terminal());
    }

    #[test]
    fn test_marker_tags() {
        assert_eq!(MarkerEvent::SpecIssue { content: String::new() }.tag(), "SPEC_ISSUE");
        assert_eq!(MarkerEvent::PlanComplete { content: String::new() }.tag(), "PLAN_COMPLETE");
        assert_eq!(
            MarkerEvent::ToBeDiscussed { content: String::new() }.tag(),
            "TO_BE_DISCUSSED"
        );
    }

    #[test]
    fn test_event_family_predicates() {
        let agent: Event = AgentEvent::AgentMessage { content: "hi".into() }.into();
        let marker: Event = MarkerEvent::Done { content: "x".into() }.into();
        let lp: Event = LoopEvent::LoopApproved { iteration: 1 }.into();
        let watch: Event = WatchEvent::BacklogWaiting.into();

        assert!(agent.is_agent() && !agent.is_marker());
        assert!(marker.is_marker() && !marker.is_loop());
        assert!(lp.is_loop() && lp.as_loop_terminal().is_some());
        assert!(watch.is_watch());
        assert!(agent.as_loop_terminal().is_none());
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event: Event = LoopEvent::LoopSpecIssue {
            iteration: 3,
            content: "clarify X".into(),
            filename: "0192.md".into(),
        }
        .into();

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("LoopSpecIssue"));
        assert!(json.contains("clarify X"));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_event_type_names() {
        let event: Event = WatchEvent::ProcessingItem {
            filename: "001-foo.md".into(),
        }
        .into();
        assert_eq!(event.event_type(), "ProcessingItem");

        let event: Event = AgentEvent::ping_now().into();
        assert_eq!(event.event_type(), "Ping");
    }
}
