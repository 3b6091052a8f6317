//! Event vocabulary and rendering
//!
//! Every observable action in cuggino is an [`Event`]: agent output,
//! extracted markers, loop phase transitions, and watch supervisor
//! activity. Components push events into a `tokio::sync::mpsc` channel
//! owned by the caller; consumers (the CLI renderer, tests) drain it.

mod render;
mod types;

pub use render::render_event;
pub use types::{AgentEvent, Event, LoopEvent, MarkerEvent, WatchEvent};
