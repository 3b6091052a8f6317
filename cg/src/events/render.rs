//! Terminal rendering of events
//!
//! One formatted line per event, routed by family. Agent pings and raw
//! tool traffic render compactly; loop phase transitions and watch
//! dispositions get the visual weight.

use colored::Colorize;

use super::types::{AgentEvent, Event, LoopEvent, MarkerEvent, WatchEvent};

/// Maximum characters of agent/tool text shown per line
const SNIPPET_LEN: usize = 200;

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_LEN {
        flat
    } else {
        let cut: String = flat.chars().take(SNIPPET_LEN).collect();
        format!("{}…", cut)
    }
}

/// Format one event for the terminal, or None for events not worth a line
pub fn render_event(event: &Event) -> Option<String> {
    match event {
        Event::Agent(e) => render_agent(e),
        Event::Marker(e) => Some(render_marker(e)),
        Event::Loop(e) => Some(render_loop(e)),
        Event::Watch(e) => Some(render_watch(e)),
    }
}

fn render_agent(event: &AgentEvent) -> Option<String> {
    match event {
        AgentEvent::SystemMessage { .. } | AgentEvent::Ping { .. } => None,
        AgentEvent::AgentMessage { content } => Some(format!("  {}", snippet(content).dimmed())),
        AgentEvent::UserMessage { content } => Some(format!("  {} {}", "user:".dimmed(), snippet(content).dimmed())),
        AgentEvent::ToolCall { name, .. } => Some(format!("  {} {}", "tool".cyan(), name.cyan())),
        AgentEvent::ToolResult { name, is_error, .. } => {
            if *is_error {
                Some(format!("  {} {} {}", "tool".cyan(), name.cyan(), "failed".red()))
            } else {
                None
            }
        }
    }
}

fn render_marker(event: &MarkerEvent) -> String {
    let tag = format!("[{}]", event.tag());
    let tag = match event {
        MarkerEvent::SpecIssue { .. } | MarkerEvent::RequestChanges { .. } => tag.yellow().bold(),
        MarkerEvent::Approved { .. } | MarkerEvent::Done { .. } | MarkerEvent::PlanComplete { .. } => {
            tag.green().bold()
        }
        _ => tag.blue(),
    };
    format!("{} {}", tag, snippet(event.content()))
}

fn render_loop(event: &LoopEvent) -> String {
    match event {
        LoopEvent::IterationStart {
            iteration,
            max_iterations,
        } => format!("{}", format!("── iteration {}/{} ──", iteration, max_iterations).bold()),
        LoopEvent::PlanningStart { iteration } => format!("{} (iteration {})", "planning".magenta(), iteration),
        LoopEvent::ImplementingStart { iteration } => {
            format!("{} (iteration {})", "implementing".magenta(), iteration)
        }
        LoopEvent::ReviewingStart { iteration } => format!("{} (iteration {})", "reviewing".magenta(), iteration),
        LoopEvent::SetupCommandOutput { exit_code, .. } => {
            format!("{} (exit {})", "setup command ran".dimmed(), exit_code)
        }
        LoopEvent::CheckCommandOutput { exit_code, .. } => {
            if *exit_code == 0 {
                format!("{}", "check passed".green())
            } else {
                format!("{} (exit {})", "check failed".red(), exit_code)
            }
        }
        LoopEvent::CommitPerformed {
            commit_hash, message, ..
        } => format!("{} {} {}", "committed".green(), commit_hash, snippet(message)),
        LoopEvent::CommitFailed { message, .. } => format!("{} {}", "commit failed:".red(), snippet(message)),
        LoopEvent::PushPerformed { remote, branch, .. } => {
            format!("{} {}/{}", "pushed".green(), remote, branch)
        }
        LoopEvent::PushFailed { message, .. } => format!("{} {}", "push failed:".red(), snippet(message)),
        LoopEvent::LoopApproved { iteration } => {
            format!("{} after {} iteration(s)", "✓ approved".green().bold(), iteration)
        }
        LoopEvent::LoopSpecIssue { filename, .. } => {
            format!("{} filed as {}", "⚠ spec issue".yellow().bold(), filename)
        }
        LoopEvent::LoopMaxIterations { max_iterations, .. } => {
            format!("{} ({} iterations)", "✗ gave up".red().bold(), max_iterations)
        }
    }
}

fn render_watch(event: &WatchEvent) -> String {
    match event {
        WatchEvent::BacklogWaiting => format!("{}", "backlog empty, waiting for work".dimmed()),
        WatchEvent::SpecIssueWaiting => {
            format!("{}", "spec issues pending, waiting for human review".yellow())
        }
        WatchEvent::ProcessingItem { filename } => format!("{} {}", "▶ processing".bold(), filename),
        WatchEvent::ItemCompleted { filename } => format!("{} {}", "✓ completed".green().bold(), filename),
        WatchEvent::ItemRetained { filename } => {
            format!("{} {} (edited while running)", "● retained".yellow(), filename)
        }
        WatchEvent::AuditStarted => format!("{}", "audit started".dimmed()),
        WatchEvent::AuditEnded => format!("{}", "audit finished".dimmed()),
        WatchEvent::AuditInterrupted => format!("{}", "audit interrupted".dimmed()),
        WatchEvent::TbdItemFound { filename, .. } => {
            format!("{} {}", "audit note filed as".blue(), filename)
        }
    }
}
