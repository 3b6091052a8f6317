//! LoopEngine - the Plan -> Implement -> Review state machine
//!
//! One run drives a fresh session through up to `max_iterations` cycles:
//!
//! ```text
//! Planning    PLAN_COMPLETE -> commit temp plan into the transcript
//!             SPEC_ISSUE    -> persist, terminal LoopSpecIssue
//! Implementing (inner loop)
//!             PROGRESS      -> optional auto-commit, re-enter
//!             DONE          -> optional auto-commit, proceed to review
//!             SPEC_ISSUE    -> persist, terminal LoopSpecIssue
//! Reviewing   APPROVED        -> terminal LoopApproved
//!             REQUEST_CHANGES -> carry review text into the next iteration
//!             SPEC_ISSUE      -> persist, terminal LoopSpecIssue
//! ```
//!
//! Every phase starts a fresh agent context; state travels exclusively
//! through the session files. Exactly one terminal loop event is emitted
//! per run, as the last loop event before the stream ends.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::check::run_shell_command;
use super::git;
use crate::agent::{AgentAdapter, SpawnOptions};
use crate::events::{Event, LoopEvent, MarkerEvent};
use crate::marker::{Extracted, MarkerExtractor, MarkerTag};
use crate::prompts::{PromptContext, Prompts, tasks};
use crate::session::{Session, SessionError};
use crate::storage::{Config, Storage, StorageError, new_entry_id};

/// The agent-driven phases of one iteration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Implementing,
    Reviewing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Planning => "planning",
            Phase::Implementing => "implementing",
            Phase::Reviewing => "reviewing",
        };
        write!(f, "{name}")
    }
}

/// Failure of a loop run
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("{phase} phase failed: {message}")]
    Phase { phase: Phase, message: String },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LoopError {
    fn phase(phase: Phase, message: impl Into<String>) -> Self {
        LoopError::Phase {
            phase,
            message: message.into(),
        }
    }
}

/// Options of one loop run
#[derive(Clone, Debug)]
pub struct LoopOptions {
    /// What this run should accomplish (sentence or `@<file>` reference)
    pub focus: String,
    /// Specs directory handed to the agents, relative to `cwd`
    pub specs_path: String,
    /// Workspace the agents operate in
    pub cwd: PathBuf,
    pub max_iterations: u32,
    pub setup_command: Option<String>,
    pub check_command: Option<String>,
    pub commit: bool,
    /// `remote/branch` push target, honored only when `commit` is set
    pub push: Option<String>,
}

impl LoopOptions {
    /// Build run options from the workspace configuration
    pub fn from_config(cwd: impl Into<PathBuf>, config: &Config, focus: impl Into<String>) -> Self {
        Self {
            focus: focus.into(),
            specs_path: config.specs_path.clone(),
            cwd: cwd.into(),
            max_iterations: config.max_iterations,
            setup_command: config.setup_command.clone(),
            check_command: config.check_command.clone(),
            commit: config.commit,
            push: config.push.clone(),
        }
    }
}

/// How a loop run ended (mirrors the terminal loop events)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    Approved { iteration: u32 },
    SpecIssue { iteration: u32, filename: String },
    MaxIterations { max_iterations: u32 },
}

/// Result of a standalone planning pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanOutcome {
    Planned { plan: String },
    SpecIssue { filename: String },
}

/// Loop execution engine
pub struct LoopEngine {
    storage: Storage,
    adapter: Arc<dyn AgentAdapter>,
    prompts: Prompts,
}

impl LoopEngine {
    pub fn new(storage: Storage, adapter: Arc<dyn AgentAdapter>) -> Self {
        Self {
            storage,
            adapter,
            prompts: Prompts::new(),
        }
    }

    /// Run the loop to its terminal event
    ///
    /// Events stream through `tx` in production order; the matching
    /// [`LoopOutcome`] is returned once the terminal event is emitted. The
    /// session fileset is removed on every exit path, including errors and
    /// cancellation.
    pub async fn run(&self, opts: &LoopOptions, tx: &mpsc::Sender<Event>) -> Result<LoopOutcome, LoopError> {
        debug!(focus = %opts.focus, max_iterations = opts.max_iterations, "LoopEngine::run: called");
        info!("Starting loop run (focus: {})", opts.focus);

        let session = Session::create(&self.storage, new_entry_id())?;

        // The reviewer diffs against where the run started.
        let baseline = if opts.commit {
            git::rev_parse_head(&opts.cwd).await
        } else {
            None
        };
        debug!(?baseline, "LoopEngine::run: captured baseline");

        for iteration in 1..=opts.max_iterations {
            info!("Loop iteration {}/{}", iteration, opts.max_iterations);
            self.emit(
                tx,
                LoopEvent::IterationStart {
                    iteration,
                    max_iterations: opts.max_iterations,
                },
            )
            .await;

            if iteration == 1 {
                self.run_setup(opts, &session, tx).await?;
            }

            // === Planning ===
            self.emit(tx, LoopEvent::PlanningStart { iteration }).await;
            let review = session.read_review()?;
            let mut context = self.phase_context(opts, &session);
            context.review = review;
            let system_prompt = self.prompts.planner(&context);

            let marker = self
                .run_phase(
                    Phase::Planning,
                    opts,
                    system_prompt,
                    tasks::PLANNER,
                    &[MarkerTag::SpecIssue, MarkerTag::PlanComplete],
                    &session,
                    tx,
                )
                .await?;
            session.clear_review()?;

            match marker {
                MarkerEvent::PlanComplete { .. } => session.commit_temp_plan()?,
                MarkerEvent::SpecIssue { content } => {
                    return self.file_spec_issue(iteration, content, tx).await;
                }
                other => {
                    return Err(LoopError::phase(
                        Phase::Planning,
                        format!("unexpected terminal marker {}", other.event_type()),
                    ));
                }
            }

            // === Implementing (inner progress loop) ===
            loop {
                self.emit(tx, LoopEvent::ImplementingStart { iteration }).await;
                self.run_check(iteration, opts, &session, tx).await?;

                let context = self.phase_context(opts, &session);
                let system_prompt = self.prompts.implementer(&context);
                let marker = self
                    .run_phase(
                        Phase::Implementing,
                        opts,
                        system_prompt,
                        tasks::IMPLEMENTER,
                        &[
                            MarkerTag::Note,
                            MarkerTag::SpecIssue,
                            MarkerTag::Progress,
                            MarkerTag::Done,
                        ],
                        &session,
                        tx,
                    )
                    .await?;

                match marker {
                    MarkerEvent::Progress { content } => {
                        self.maybe_commit(iteration, opts, &content, tx).await;
                    }
                    MarkerEvent::Done { content } => {
                        self.maybe_commit(iteration, opts, &content, tx).await;
                        break;
                    }
                    MarkerEvent::SpecIssue { content } => {
                        return self.file_spec_issue(iteration, content, tx).await;
                    }
                    other => {
                        return Err(LoopError::phase(
                            Phase::Implementing,
                            format!("unexpected terminal marker {}", other.event_type()),
                        ));
                    }
                }
            }

            // === Reviewing ===
            self.emit(tx, LoopEvent::ReviewingStart { iteration }).await;
            self.run_check(iteration, opts, &session, tx).await?;

            let mut context = self.phase_context(opts, &session);
            if let Some(baseline) = &baseline {
                context.diff = git::diff_since(&opts.cwd, baseline).await.filter(|d| !d.is_empty());
            }
            let system_prompt = self.prompts.reviewer(&context);
            let marker = self
                .run_phase(
                    Phase::Reviewing,
                    opts,
                    system_prompt,
                    tasks::REVIEWER,
                    &[MarkerTag::SpecIssue, MarkerTag::Approved, MarkerTag::RequestChanges],
                    &session,
                    tx,
                )
                .await?;

            match marker {
                MarkerEvent::Approved { .. } => {
                    info!("Loop approved after {} iteration(s)", iteration);
                    self.emit(tx, LoopEvent::LoopApproved { iteration }).await;
                    return Ok(LoopOutcome::Approved { iteration });
                }
                MarkerEvent::RequestChanges { content } => {
                    // The reviewer may already have written its findings; the
                    // marker content is the fallback carried forward.
                    if session.read_review()?.is_none() {
                        session.write_review(&content)?;
                    }
                    info!("Reviewer requested changes, re-planning");
                }
                MarkerEvent::SpecIssue { content } => {
                    return self.file_spec_issue(iteration, content, tx).await;
                }
                other => {
                    return Err(LoopError::phase(
                        Phase::Reviewing,
                        format!("unexpected terminal marker {}", other.event_type()),
                    ));
                }
            }
        }

        info!("Loop gave up after {} iterations", opts.max_iterations);
        self.emit(
            tx,
            LoopEvent::LoopMaxIterations {
                iteration: opts.max_iterations,
                max_iterations: opts.max_iterations,
            },
        )
        .await;
        Ok(LoopOutcome::MaxIterations {
            max_iterations: opts.max_iterations,
        })
    }

    /// Run a single planning phase outside the full loop
    ///
    /// Used by the `plan` subcommand: plans against the focus, returns the
    /// committed plan text (or the filename of the spec issue the planner
    /// filed instead). The session is discarded afterwards.
    pub async fn plan_once(&self, opts: &LoopOptions, tx: &mpsc::Sender<Event>) -> Result<PlanOutcome, LoopError> {
        debug!(focus = %opts.focus, "LoopEngine::plan_once: called");
        let session = Session::create(&self.storage, new_entry_id())?;

        self.emit(tx, LoopEvent::PlanningStart { iteration: 1 }).await;
        let context = self.phase_context(opts, &session);
        let system_prompt = self.prompts.planner(&context);

        let marker = self
            .run_phase(
                Phase::Planning,
                opts,
                system_prompt,
                tasks::PLANNER,
                &[MarkerTag::SpecIssue, MarkerTag::PlanComplete],
                &session,
                tx,
            )
            .await?;

        match marker {
            MarkerEvent::PlanComplete { .. } => {
                session.commit_temp_plan()?;
                let plan = std::fs::read_to_string(session.transcript_path()).map_err(|e| {
                    LoopError::phase(Phase::Planning, format!("cannot read committed plan: {e}"))
                })?;
                Ok(PlanOutcome::Planned { plan })
            }
            MarkerEvent::SpecIssue { content } => match self.file_spec_issue(1, content, tx).await? {
                LoopOutcome::SpecIssue { filename, .. } => Ok(PlanOutcome::SpecIssue { filename }),
                other => Err(LoopError::phase(
                    Phase::Planning,
                    format!("unexpected outcome {other:?} while filing spec issue"),
                )),
            },
            other => Err(LoopError::phase(
                Phase::Planning,
                format!("unexpected terminal marker {}", other.event_type()),
            )),
        }
    }

    /// Spawn one agent phase and return its terminal marker
    ///
    /// Every event is forwarded to the output stream; every extracted
    /// marker is also persisted to the session transcript. The phase ends
    /// at the first terminal marker; a stream that ends without one fails
    /// the run.
    #[allow(clippy::too_many_arguments)]
    async fn run_phase(
        &self,
        phase: Phase,
        opts: &LoopOptions,
        system_prompt: String,
        user_prompt: &str,
        tags: &[MarkerTag],
        session: &Session,
        tx: &mpsc::Sender<Event>,
    ) -> Result<MarkerEvent, LoopError> {
        debug!(%phase, "LoopEngine::run_phase: called");

        let mut stream = self
            .adapter
            .spawn(SpawnOptions {
                cwd: opts.cwd.clone(),
                prompt: user_prompt.to_string(),
                system_prompt: Some(system_prompt),
                dangerously_skip_permissions: true,
                session_id: None,
                resume_session_id: None,
            })
            .await
            .map_err(|e| LoopError::phase(phase, e.message))?;

        let extractor = MarkerExtractor::new(tags);
        while let Some(item) = stream.next().await {
            let event = item.map_err(|e| LoopError::phase(phase, e.message))?;
            for element in extractor.split(event) {
                match element {
                    Extracted::Agent(agent_event) => {
                        let _ = tx.send(agent_event.into()).await;
                    }
                    Extracted::Marker(marker) => {
                        session.append_marker(&marker)?;
                        let _ = tx.send(marker.clone().into()).await;
                        if marker.is_terminal() {
                            debug!(%phase, marker = marker.event_type(), "LoopEngine::run_phase: terminal marker");
                            // Dropping the stream terminates the agent.
                            return Ok(marker);
                        }
                    }
                }
            }
        }

        Err(LoopError::phase(phase, "no terminal marker received"))
    }

    /// Run the setup command once per run, if configured
    async fn run_setup(
        &self,
        opts: &LoopOptions,
        session: &Session,
        tx: &mpsc::Sender<Event>,
    ) -> Result<(), LoopError> {
        let Some(command) = &opts.setup_command else {
            return Ok(());
        };
        debug!(%command, "LoopEngine::run_setup: called");

        let result = run_shell_command(command, &opts.cwd).await;
        session.write_setup_output(&result.output)?;
        self.emit(
            tx,
            LoopEvent::SetupCommandOutput {
                iteration: 1,
                output: result.output,
                exit_code: result.exit_code,
                file: session.setup_output_path().display().to_string(),
            },
        )
        .await;
        Ok(())
    }

    /// Run the check command and surface its output, if configured
    async fn run_check(
        &self,
        iteration: u32,
        opts: &LoopOptions,
        session: &Session,
        tx: &mpsc::Sender<Event>,
    ) -> Result<(), LoopError> {
        let Some(command) = &opts.check_command else {
            return Ok(());
        };
        debug!(iteration, %command, "LoopEngine::run_check: called");

        let result = run_shell_command(command, &opts.cwd).await;
        session.write_check_output(&result.output)?;
        self.emit(
            tx,
            LoopEvent::CheckCommandOutput {
                iteration,
                output: result.output,
                exit_code: result.exit_code,
                file: session.check_output_path().display().to_string(),
            },
        )
        .await;
        Ok(())
    }

    /// Auto-commit (and optionally push) after an implementing pass
    async fn maybe_commit(&self, iteration: u32, opts: &LoopOptions, message: &str, tx: &mpsc::Sender<Event>) {
        if !opts.commit {
            return;
        }
        debug!(iteration, "LoopEngine::maybe_commit: called");

        let hash = match git::auto_commit(&opts.cwd, &opts.specs_path, message).await {
            Ok(Some(hash)) => hash,
            Ok(None) => {
                debug!("LoopEngine::maybe_commit: nothing to commit");
                return;
            }
            Err(message) => {
                warn!(%message, "Auto-commit failed");
                self.emit(tx, LoopEvent::CommitFailed { iteration, message }).await;
                return;
            }
        };

        self.emit(
            tx,
            LoopEvent::CommitPerformed {
                iteration,
                commit_hash: hash,
                message: message.to_string(),
            },
        )
        .await;

        let Some(target) = &opts.push else {
            return;
        };
        let Some((remote, branch)) = git::split_push_target(target) else {
            self.emit(
                tx,
                LoopEvent::PushFailed {
                    iteration,
                    message: format!("invalid push target '{target}', expected remote/branch"),
                },
            )
            .await;
            return;
        };

        match git::push(&opts.cwd, remote, branch).await {
            Ok(()) => {
                self.emit(
                    tx,
                    LoopEvent::PushPerformed {
                        iteration,
                        remote: remote.to_string(),
                        branch: branch.to_string(),
                    },
                )
                .await;
            }
            Err(message) => {
                warn!(%message, "Push failed");
                self.emit(tx, LoopEvent::PushFailed { iteration, message }).await;
            }
        }
    }

    /// Persist a spec issue and emit the terminal event
    async fn file_spec_issue(
        &self,
        iteration: u32,
        content: String,
        tx: &mpsc::Sender<Event>,
    ) -> Result<LoopOutcome, LoopError> {
        let filename = self.storage.write_spec_issue(&content)?;
        info!(%filename, "Spec issue filed, stopping loop");
        self.emit(
            tx,
            LoopEvent::LoopSpecIssue {
                iteration,
                content,
                filename: filename.clone(),
            },
        )
        .await;
        Ok(LoopOutcome::SpecIssue { iteration, filename })
    }

    /// Substitution inputs shared by every phase prompt
    fn phase_context(&self, opts: &LoopOptions, session: &Session) -> PromptContext {
        PromptContext {
            focus: Some(opts.focus.clone()),
            cwd: Some(opts.cwd.display().to_string()),
            specs_path: Some(opts.specs_path.clone()),
            plan_path: Some(session.temp_plan_path().display().to_string()),
            session_path: Some(session.transcript_path().display().to_string()),
            review_path: Some(session.review_path().display().to_string()),
            check_output_path: Some(session.check_output_path().display().to_string()),
            memory_path: Some(self.storage.memory_path().display().to_string()),
            ..Default::default()
        }
    }

    async fn emit(&self, tx: &mpsc::Sender<Event>, event: LoopEvent) {
        debug!(event_type = event.event_type(), "LoopEngine::emit");
        let _ = tx.send(event.into()).await;
    }
}

/// Write a plausible temp plan next to a session transcript (test support)
#[cfg(test)]
pub(crate) fn write_temp_plan_in(wip_dir: &std::path::Path) {
    // The transcript is the only wip file whose stem has no further dot.
    let entries = std::fs::read_dir(wip_dir).expect("wip dir readable");
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix(".md")
            && !stem.contains('.')
        {
            std::fs::write(wip_dir.join(format!("{stem}.plan.md")), "# Plan\n- do it\n").expect("write temp plan");
            return;
        }
    }
    panic!("no session transcript found in {}", wip_dir.display());
}
