//! Embedded prompt templates
//!
//! Compiled into the binary from the .pmt files at build time.

/// Planner system prompt
pub const PLANNER: &str = include_str!("../../prompts/planner.pmt");

/// Implementer system prompt
pub const IMPLEMENTER: &str = include_str!("../../prompts/implementer.pmt");

/// Reviewer system prompt
pub const REVIEWER: &str = include_str!("../../prompts/reviewer.pmt");

/// Idle-time audit system prompt
pub const AUDIT: &str = include_str!("../../prompts/audit.pmt");

/// Interactive PM-mode system prompt
pub const PM: &str = include_str!("../../prompts/pm.pmt");

/// Every registered template name
pub const TEMPLATE_NAMES: &[&str] = &["planner", "implementer", "reviewer", "audit", "pm"];

/// Get the embedded template by name
pub fn template_source(name: &str) -> Option<&'static str> {
    match name {
        "planner" => Some(PLANNER),
        "implementer" => Some(IMPLEMENTER),
        "reviewer" => Some(REVIEWER),
        "audit" => Some(AUDIT),
        "pm" => Some(PM),
        _ => None,
    }
}
