//! cuggino - autonomous coder-loop supervisor
//!
//! cuggino drives a local codebase forward by repeatedly spawning an LLM
//! agent CLI in three roles - planner, implementer, reviewer - against a
//! human-curated backlog of markdown task files, until each task is
//! approved or abandoned. A watch supervisor feeds the loop from two
//! on-disk queues and runs a low-priority audit agent while idle.
//!
//! # Core Concepts
//!
//! - **Fresh Context Always**: every phase starts a new agent conversation
//! - **State in Files**: plans, reviews, and progress live in the session
//!   fileset under `.cuggino/wip/`, not in memory
//! - **Markers over Promises**: agents signal outcomes with tagged regions
//!   (`<DONE>…</DONE>`) extracted from their text output
//! - **Hash-Guarded Queues**: backlog files are deleted only when their
//!   bytes are untouched since pickup
//!
//! # Modules
//!
//! - [`agent`] - agent CLI adapters (claude / codex dialects)
//! - [`marker`] - marker extraction from agent text
//! - [`storage`] - the `.cuggino` workspace tree and configuration
//! - [`session`] - per-run scratch files
//! - [`r#loop`] - the Plan -> Implement -> Review engine
//! - [`watch`] - the backlog supervisor with idle-time audit
//! - [`events`] - the event vocabulary and terminal rendering

pub mod agent;
pub mod cli;
pub mod events;
pub mod marker;
pub mod notify;
pub mod prompts;
pub mod session;
pub mod storage;
pub mod watch;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use agent::{AgentAdapter, AgentKind, AgentStream, ClaudeAdapter, CodexAdapter, LlmSessionError, create_adapter};
pub use events::{AgentEvent, Event, LoopEvent, MarkerEvent, WatchEvent, render_event};
pub use marker::{Extracted, MarkerExtractor, MarkerTag};
pub use notify::Notifier;
pub use prompts::{PromptContext, Prompts};
pub use r#loop::{LoopEngine, LoopError, LoopOptions, LoopOutcome, PlanOutcome};
pub use session::{Session, SessionError};
pub use storage::{Config, NotifyMode, Storage, StorageError, new_entry_id, read_config, write_config};
pub use watch::{WatchError, WatchSupervisor, WatchTiming, content_hash};
