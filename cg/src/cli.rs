//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::agent::AgentKind;

/// cuggino - autonomous coder-loop supervisor
#[derive(Parser)]
#[command(
    name = "cg",
    about = "Drive a codebase forward with plan/implement/review agent loops",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Agent backend used for loop phases
    #[arg(long, global = true, default_value = "claude")]
    pub agent: AgentArg,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one loop against a focus in the current workspace
    Run {
        /// What the run should accomplish (sentence or @<file> reference)
        #[arg(long)]
        focus: String,
    },

    /// Watch the backlog and run loops until stopped
    Watch,

    /// Run a single planning phase and print the plan
    Plan {
        /// What the plan should accomplish
        #[arg(long)]
        focus: String,
    },

    /// Open an interactive product-manager session
    Pm {
        /// Agent backend for the session (defaults to the global --agent)
        #[arg(long)]
        agent: Option<AgentArg>,
    },

    /// Initialize the workspace layout and default configuration
    Setup,
}

/// Agent backend selection on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AgentArg {
    Claude,
    Codex,
}

impl From<AgentArg> for AgentKind {
    fn from(arg: AgentArg) -> Self {
        match arg {
            AgentArg::Claude => AgentKind::Claude,
            AgentArg::Codex => AgentKind::Codex,
        }
    }
}

/// Path of the daemon-style log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cuggino")
        .join("logs")
        .join("cuggino.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_requires_focus() {
        assert!(Cli::try_parse_from(["cg", "run"]).is_err());
        let cli = Cli::try_parse_from(["cg", "run", "--focus", "add foo"]).unwrap();
        match cli.command {
            Command::Run { focus } => assert_eq!(focus, "add foo"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_agent_flag_selects_backend() {
        let cli = Cli::try_parse_from(["cg", "--agent", "codex", "watch"]).unwrap();
        assert_eq!(AgentKind::from(cli.agent), AgentKind::Codex);
    }

    #[test]
    fn test_pm_agent_override() {
        let cli = Cli::try_parse_from(["cg", "pm", "--agent", "codex"]).unwrap();
        match cli.command {
            Command::Pm { agent } => assert_eq!(agent, Some(AgentArg::Codex)),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
