//! cuggino - autonomous coder-loop supervisor
//!
//! CLI entry point for loop runs, backlog watching, planning, and the
//! interactive PM session.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cuggino::agent::InteractiveOptions;
use cuggino::cli::{Cli, Command, get_log_path};
use cuggino::prompts::{PromptContext, Prompts};
use cuggino::r#loop::{LoopEngine, LoopOptions, LoopOutcome, PlanOutcome};
use cuggino::watch::WatchSupervisor;
use cuggino::{AgentKind, Config, Event, Storage, create_adapter, read_config, render_event, write_config};

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    let level = match cli_log_level.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Spawn a task printing every event to the terminal
fn spawn_renderer(mut rx: mpsc::Receiver<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(line) = render_event(&event) {
                println!("{line}");
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let agent: AgentKind = cli.agent.into();
    debug!(command = ?cli.command, %agent, "main: dispatching command");

    match cli.command {
        Command::Run { focus } => cmd_run(agent, &focus).await,
        Command::Watch => cmd_watch(agent).await,
        Command::Plan { focus } => cmd_plan(agent, &focus).await,
        Command::Pm { agent: pm_agent } => {
            let agent = pm_agent.map(AgentKind::from).unwrap_or(agent);
            cmd_pm(agent).await
        }
        Command::Setup => cmd_setup().await,
    }
}

/// Open the workspace rooted at the current directory
fn open_workspace() -> Result<(Storage, Config)> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let storage = Storage::init(&cwd).context("Failed to initialize workspace storage")?;
    let config = read_config(&cwd);
    Ok((storage, config))
}

/// Run one loop against a focus (batch mode)
async fn cmd_run(agent: AgentKind, focus: &str) -> Result<()> {
    debug!(%agent, %focus, "cmd_run: called");
    let (storage, config) = open_workspace()?;

    println!("Running loop");
    println!("  Focus: {}", focus);
    println!("  Agent: {}", agent);
    println!("  Max iterations: {}", config.max_iterations);
    println!();

    let opts = LoopOptions::from_config(storage.cwd(), &config, focus);
    let engine = LoopEngine::new(storage, create_adapter(agent));

    let (tx, rx) = mpsc::channel(1024);
    let renderer = spawn_renderer(rx);
    let outcome = engine.run(&opts, &tx).await;
    drop(tx);
    let _ = renderer.await;

    match outcome.context("Loop run failed")? {
        LoopOutcome::Approved { iteration } => {
            println!("\n✓ Approved after {} iteration(s)", iteration);
        }
        LoopOutcome::SpecIssue { filename, .. } => {
            println!("\n⚠ Spec issue filed as {filename} - resolve it with `cg pm`");
        }
        LoopOutcome::MaxIterations { max_iterations } => {
            println!("\n✗ Gave up after {} iterations", max_iterations);
        }
    }
    Ok(())
}

/// Watch the backlog until interrupted
async fn cmd_watch(agent: AgentKind) -> Result<()> {
    debug!(%agent, "cmd_watch: called");
    let (storage, config) = open_workspace()?;

    println!("Watching {}", storage.backlog_dir().display());
    if config.audit {
        println!("Idle-time audit enabled");
    }

    let supervisor = Arc::new(WatchSupervisor::new(storage, create_adapter(agent), config));

    let (tx, rx) = mpsc::channel(1024);
    let renderer = spawn_renderer(rx);

    let mut watch_handle = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run(&tx).await })
    };

    let interrupted;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = &mut watch_handle => {
                let _ = renderer.await;
                result.context("watch task panicked")??;
                return Ok(());
            }
            _ = sigint.recv() => {
                debug!("cmd_watch: SIGINT received");
                warn!("SIGINT received");
                interrupted = true;
            }
            _ = sigterm.recv() => {
                debug!("cmd_watch: SIGTERM received");
                warn!("SIGTERM received");
                interrupted = true;
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = &mut watch_handle => {
                let _ = renderer.await;
                result.context("watch task panicked")??;
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("cmd_watch: ctrl_c received");
                interrupted = true;
            }
        }
    }

    // Cancellation propagates down: dropping the watch task tears down any
    // running loop, which in turn terminates its agent child and removes
    // the session files.
    debug!(interrupted, "cmd_watch: shutting down");
    watch_handle.abort();
    let _ = watch_handle.await;
    let _ = renderer.await;
    println!("\nWatch stopped.");
    Ok(())
}

/// Run a single planning phase and print the plan
async fn cmd_plan(agent: AgentKind, focus: &str) -> Result<()> {
    debug!(%agent, %focus, "cmd_plan: called");
    let (storage, config) = open_workspace()?;

    let opts = LoopOptions::from_config(storage.cwd(), &config, focus);
    let engine = LoopEngine::new(storage, create_adapter(agent));

    let (tx, rx) = mpsc::channel(1024);
    let renderer = spawn_renderer(rx);
    let outcome = engine.plan_once(&opts, &tx).await;
    drop(tx);
    let _ = renderer.await;

    match outcome.context("Planning failed")? {
        PlanOutcome::Planned { plan } => {
            println!("\n{plan}");
        }
        PlanOutcome::SpecIssue { filename } => {
            println!("\n⚠ Spec issue filed as {filename} - resolve it with `cg pm`");
        }
    }
    Ok(())
}

/// Open an interactive PM session
async fn cmd_pm(agent: AgentKind) -> Result<()> {
    debug!(%agent, "cmd_pm: called");
    let (storage, config) = open_workspace()?;

    let context = PromptContext {
        cwd: Some(storage.cwd().display().to_string()),
        specs_path: Some(config.specs_path.clone()),
        backlog_path: Some(storage.backlog_dir().display().to_string()),
        spec_issues_path: Some(storage.spec_issues_dir().display().to_string()),
        tbd_path: Some(storage.tbd_dir().display().to_string()),
        memory_path: Some(storage.memory_path().display().to_string()),
        ..Default::default()
    };
    let system_prompt = Prompts::new().pm(&context);

    let adapter = create_adapter(agent);
    let code = adapter
        .interactive(InteractiveOptions {
            cwd: storage.cwd().to_path_buf(),
            system_prompt: Some(system_prompt),
            dangerously_skip_permissions: false,
        })
        .await
        .context("PM session failed")?;

    if code != 0 {
        debug!(code, "cmd_pm: agent exited nonzero");
        std::process::exit(code);
    }
    Ok(())
}

/// Initialize the workspace layout and default configuration
async fn cmd_setup() -> Result<()> {
    debug!("cmd_setup: called");
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let storage = Storage::init(&cwd).context("Failed to initialize workspace storage")?;

    if !storage.config_path().exists() {
        write_config(&cwd, &Config::default()).context("Failed to write default configuration")?;
        println!("Created {}", storage.config_path().display());
    } else {
        println!("Keeping existing {}", storage.config_path().display());
    }

    if !storage.memory_path().exists() {
        fs::write(storage.memory_path(), "# Memory\n").context("Failed to create memory file")?;
        println!("Created {}", storage.memory_path().display());
    }

    println!("Workspace ready:");
    for dir in [
        storage.backlog_dir(),
        storage.spec_issues_dir(),
        storage.tbd_dir(),
        storage.wip_dir(),
    ] {
        println!("  {}", dir.display());
    }
    println!("\nDrop backlog tasks into {} and run `cg watch`.", storage.backlog_dir().display());
    Ok(())
}
