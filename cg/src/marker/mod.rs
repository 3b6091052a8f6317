//! Marker extraction from agent text
//!
//! Agents signal structured outcomes by embedding XML-like tagged regions
//! (`<DONE>...</DONE>`) in their free-form text. The extractor scans each
//! `AgentMessage` for a configured whitelist of tags and re-emits, in
//! source order, the cleaned text fragments and the typed marker events.
//! All other agent events pass through untouched.

use regex::Regex;
use tracing::debug;

use crate::events::{AgentEvent, MarkerEvent};

/// A recognizable wire tag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerTag {
    Note,
    SpecIssue,
    Progress,
    Done,
    Approved,
    RequestChanges,
    PlanComplete,
    ToBeDiscussed,
}

impl MarkerTag {
    /// The tag name as it appears on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            MarkerTag::Note => "NOTE",
            MarkerTag::SpecIssue => "SPEC_ISSUE",
            MarkerTag::Progress => "PROGRESS",
            MarkerTag::Done => "DONE",
            MarkerTag::Approved => "APPROVED",
            MarkerTag::RequestChanges => "REQUEST_CHANGES",
            MarkerTag::PlanComplete => "PLAN_COMPLETE",
            MarkerTag::ToBeDiscussed => "TO_BE_DISCUSSED",
        }
    }

    /// Build the marker event for a trimmed tag body
    pub fn make(&self, content: String) -> MarkerEvent {
        match self {
            MarkerTag::Note => MarkerEvent::Note { content },
            MarkerTag::SpecIssue => MarkerEvent::SpecIssue { content },
            MarkerTag::Progress => MarkerEvent::Progress { content },
            MarkerTag::Done => MarkerEvent::Done { content },
            MarkerTag::Approved => MarkerEvent::Approved { content },
            MarkerTag::RequestChanges => MarkerEvent::RequestChanges { content },
            MarkerTag::PlanComplete => MarkerEvent::PlanComplete { content },
            MarkerTag::ToBeDiscussed => MarkerEvent::ToBeDiscussed { content },
        }
    }
}

/// One element of the extractor's ordered output
#[derive(Clone, Debug, PartialEq)]
pub enum Extracted {
    /// A pass-through or re-emitted agent event
    Agent(AgentEvent),
    /// A recognized marker
    Marker(MarkerEvent),
}

/// Stream transformer splitting agent messages into text and markers
pub struct MarkerExtractor {
    tags: Vec<MarkerTag>,
    patterns: Vec<Regex>,
}

impl MarkerExtractor {
    /// Create an extractor recognizing the given tag whitelist
    pub fn new(tags: &[MarkerTag]) -> Self {
        debug!(?tags, "MarkerExtractor::new: called");
        let patterns = tags
            .iter()
            .map(|t| {
                let name = t.wire_name();
                // Bodies are non-greedy and may span newlines. Tags do not nest.
                Regex::new(&format!(r"(?s)<{name}>(.*?)</{name}>")).expect("static tag pattern")
            })
            .collect();
        Self {
            tags: tags.to_vec(),
            patterns,
        }
    }

    /// Split one agent event into its ordered text/marker elements
    ///
    /// Non-message events pass through unchanged. For messages, markers and
    /// the trimmed text fragments around them are emitted in positional
    /// order; fragments that are empty after trimming are dropped.
    pub fn split(&self, event: AgentEvent) -> Vec<Extracted> {
        let content = match event {
            AgentEvent::AgentMessage { content } => content,
            other => return vec![Extracted::Agent(other)],
        };
        self.split_text(&content)
    }

    fn split_text(&self, text: &str) -> Vec<Extracted> {
        // (start, end, tag index, body range)
        let mut matches: Vec<(usize, usize, usize)> = Vec::new();
        let mut bodies: Vec<String> = Vec::new();
        for (idx, pattern) in self.patterns.iter().enumerate() {
            for caps in pattern.captures_iter(text) {
                let whole = caps.get(0).expect("match 0");
                let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                matches.push((whole.start(), whole.end(), idx));
                bodies.push(body.to_string());
            }
        }

        // Walk left to right; on overlap the earlier start wins.
        let mut order: Vec<usize> = (0..matches.len()).collect();
        order.sort_by_key(|&i| matches[i].0);

        let mut out = Vec::new();
        let mut cursor = 0usize;
        for i in order {
            let (start, end, tag_idx) = matches[i];
            if start < cursor {
                debug!(start, cursor, "MarkerExtractor::split_text: dropping overlapping match");
                continue;
            }
            push_text(&mut out, &text[cursor..start]);
            let marker = self.tags[tag_idx].make(bodies[i].trim().to_string());
            out.push(Extracted::Marker(marker));
            cursor = end;
        }
        push_text(&mut out, &text[cursor..]);
        out
    }
}

fn push_text(out: &mut Vec<Extracted>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        out.push(Extracted::Agent(AgentEvent::AgentMessage {
            content: trimmed.to_string(),
        }));
    }
}
