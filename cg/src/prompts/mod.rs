//! Prompt templates
//!
//! System prompts are `.pmt` files compiled into the binary and rendered
//! with Handlebars over a [`PromptContext`]. The per-phase user prompts are
//! deliberately one-liners: all real context travels through the system
//! prompt and the files it points at.

mod embedded;

use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

pub use embedded::template_source;

/// One-line user prompts identifying each phase's task
pub mod tasks {
    pub const PLANNER: &str = "Plan the work for the current focus.";
    pub const IMPLEMENTER: &str = "Continue implementing the plan.";
    pub const REVIEWER: &str = "Review the work of this run and give a verdict.";
    pub const AUDIT: &str = "Audit the workspace for findings worth discussing.";
}

/// Substitution inputs for the system prompt templates
///
/// Only the fields a template references need to be set; absent optionals
/// simply disable their template sections.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PromptContext {
    pub focus: Option<String>,
    pub cwd: Option<String>,
    pub specs_path: Option<String>,
    pub plan_path: Option<String>,
    pub session_path: Option<String>,
    pub review_path: Option<String>,
    pub check_output_path: Option<String>,
    pub memory_path: Option<String>,
    pub backlog_path: Option<String>,
    pub spec_issues_path: Option<String>,
    pub tbd_path: Option<String>,
    /// Reviewer feedback carried into the next planning pass
    pub review: Option<String>,
    /// Advisory `git diff` since the run's baseline commit
    pub diff: Option<String>,
}

/// Registry of the embedded system prompt templates
pub struct Prompts {
    handlebars: Handlebars<'static>,
}

impl Prompts {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        // Templates produce prompts, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);
        for name in embedded::TEMPLATE_NAMES {
            let source = embedded::template_source(name).expect("embedded template");
            handlebars
                .register_template_string(name, source)
                .expect("embedded template parses");
        }
        Self { handlebars }
    }

    /// Render the named template over the context
    pub fn render(&self, name: &str, context: &PromptContext) -> String {
        debug!(%name, "Prompts::render: called");
        match self.handlebars.render(name, context) {
            Ok(prompt) => prompt,
            Err(e) => {
                // Registration validated every template; render can only fail
                // on helper errors, which these templates do not use.
                tracing::error!(%name, error = %e, "template render failed");
                String::new()
            }
        }
    }

    pub fn planner(&self, context: &PromptContext) -> String {
        self.render("planner", context)
    }

    pub fn implementer(&self, context: &PromptContext) -> String {
        self.render("implementer", context)
    }

    pub fn reviewer(&self, context: &PromptContext) -> String {
        self.render("reviewer", context)
    }

    pub fn audit(&self, context: &PromptContext) -> String {
        self.render("audit", context)
    }

    pub fn pm(&self, context: &PromptContext) -> String {
        self.render("pm", context)
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self::new()
    }
}
