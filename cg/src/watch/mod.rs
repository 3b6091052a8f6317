//! Watch supervisor
//!
//! The top-level loop: wait until the backlog has work and no spec issues
//! are pending, pick the first backlog file, run the loop engine against
//! it, and dispose of the file afterwards. Deletion is guarded by a
//! content hash taken at pickup, so a task a human edited mid-run is kept.
//! While idle, an optional audit agent runs as a background task and is
//! aborted the moment work arrives.

mod audit;
mod idle;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::agent::AgentAdapter;
use crate::events::{Event, WatchEvent};
use crate::notify::Notifier;
use crate::prompts::{PromptContext, Prompts};
use crate::r#loop::{LoopEngine, LoopError, LoopOptions, LoopOutcome};
use crate::storage::{Config, Storage, StorageError};

pub(crate) use idle::visible_files_sorted;

/// Failure of the watch supervisor
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch failed: {message}")]
    Failed { message: String },
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WatchError {
    fn failed(message: impl Into<String>) -> Self {
        WatchError::Failed {
            message: message.into(),
        }
    }
}

/// Timing knobs of the supervisor
#[derive(Clone, Copy, Debug)]
pub struct WatchTiming {
    /// Quiet period required after a filesystem event before re-sampling
    pub debounce_window: Duration,
    /// Delay before the audit agent starts, absorbing immediate work
    pub audit_grace: Duration,
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_secs(30),
            audit_grace: Duration::from_secs(1),
        }
    }
}

/// Stable 64-bit content hash guarding backlog deletion
///
/// Byte-identical comparison: SHA-256 of the raw bytes, folded to the
/// first 8 digest bytes.
pub fn content_hash(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// Top-level supervisor composing idle detection, loop runs, and audit
pub struct WatchSupervisor {
    storage: Storage,
    adapter: Arc<dyn AgentAdapter>,
    config: Config,
    timing: WatchTiming,
    prompts: Prompts,
    notifier: Notifier,
}

impl WatchSupervisor {
    pub fn new(storage: Storage, adapter: Arc<dyn AgentAdapter>, config: Config) -> Self {
        let notifier = Notifier::new(config.notify);
        Self {
            storage,
            adapter,
            config,
            timing: WatchTiming::default(),
            prompts: Prompts::new(),
            notifier,
        }
    }

    /// Override the timing knobs (tests compress them)
    pub fn with_timing(mut self, timing: WatchTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Run until cancelled
    ///
    /// Every event of every loop run is forwarded to `tx`, interleaved
    /// with the supervisor's own events. Loop failures propagate and end
    /// the stream; dispositions never do.
    pub async fn run(&self, tx: &mpsc::Sender<Event>) -> Result<(), WatchError> {
        info!("Watch supervisor started");
        loop {
            self.idle_phase(tx).await?;
            self.work_phase(tx).await?;
        }
    }

    /// Wait for work, auditing in the background when enabled
    async fn idle_phase(&self, tx: &mpsc::Sender<Event>) -> Result<(), WatchError> {
        debug!("WatchSupervisor::idle_phase: called");

        let audit_handle = if self.config.audit {
            let context = PromptContext {
                cwd: Some(self.storage.cwd().display().to_string()),
                specs_path: Some(self.config.specs_path.clone()),
                memory_path: Some(self.storage.memory_path().display().to_string()),
                ..Default::default()
            };
            Some(audit::spawn_audit(
                self.storage.clone(),
                self.adapter.clone(),
                self.prompts.audit(&context),
                self.timing.audit_grace,
                tx.clone(),
            ))
        } else {
            None
        };

        let result = idle::wait_for_work(&self.storage, &self.timing, &self.notifier, tx).await;

        // Release the audit fiber unconditionally, however the idle phase
        // ended.
        if let Some(handle) = audit_handle {
            let finished = handle.is_finished();
            handle.abort();
            let _ = handle.await;
            let event = if finished {
                WatchEvent::AuditEnded
            } else {
                WatchEvent::AuditInterrupted
            };
            let _ = tx.send(event.into()).await;
        }

        result
    }

    /// Pick the first backlog item, run the loop, dispose of the file
    async fn work_phase(&self, tx: &mpsc::Sender<Event>) -> Result<(), WatchError> {
        let backlog_dir = self.storage.backlog_dir();
        let names = visible_files_sorted(&backlog_dir)?;
        let Some(filename) = names.first() else {
            debug!("WatchSupervisor::work_phase: backlog drained before pickup");
            return Ok(());
        };
        let path = backlog_dir.join(filename);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%filename, "WatchSupervisor::work_phase: item vanished before pickup");
                return Ok(());
            }
            Err(e) => return Err(WatchError::failed(format!("cannot read {}: {e}", path.display()))),
        };
        let original_hash = content_hash(&bytes);

        info!(%filename, "Processing backlog item");
        let _ = tx.send(WatchEvent::ProcessingItem { filename: filename.clone() }.into()).await;

        let focus = format!("@{}", path.display());
        let opts = LoopOptions::from_config(self.storage.cwd(), &self.config, focus);
        let engine = LoopEngine::new(self.storage.clone(), self.adapter.clone());
        let outcome = engine.run(&opts, tx).await?;

        match outcome {
            LoopOutcome::Approved { .. } | LoopOutcome::MaxIterations { .. } => {
                self.dispose(&path, filename, original_hash, tx).await;
            }
            LoopOutcome::SpecIssue { .. } => {
                // The filed spec issue is the work item now; the next idle
                // phase observes it and blocks.
                debug!(%filename, "WatchSupervisor::work_phase: spec issue filed, item kept");
            }
        }
        Ok(())
    }

    /// Delete the item iff its bytes are untouched since pickup
    async fn dispose(&self, path: &Path, filename: &str, original_hash: u64, tx: &mpsc::Sender<Event>) {
        debug!(%filename, "WatchSupervisor::dispose: called");
        let current = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%filename, "WatchSupervisor::dispose: item already gone");
                return;
            }
            Err(e) => {
                debug!(%filename, error = %e, "WatchSupervisor::dispose: unreadable, keeping");
                let _ = tx.send(WatchEvent::ItemRetained { filename: filename.to_string() }.into()).await;
                return;
            }
        };

        if content_hash(&current) == original_hash {
            let _ = std::fs::remove_file(path);
            info!(%filename, "Backlog item completed");
            let _ = tx.send(WatchEvent::ItemCompleted { filename: filename.to_string() }.into()).await;
        } else {
            info!(%filename, "Backlog item edited while running, keeping it");
            let _ = tx.send(WatchEvent::ItemRetained { filename: filename.to_string() }.into()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::tempdir;

    use crate::agent::scripted::{ScriptedAdapter, ScriptedRun, says, says_after, says_hanging};
    use crate::r#loop::write_temp_plan_in;

    const PLAN: &str = "<PLAN_COMPLETE>ok</PLAN_COMPLETE>";

    fn fast_timing() -> WatchTiming {
        WatchTiming {
            debounce_window: Duration::from_millis(50),
            audit_grace: Duration::from_millis(10),
        }
    }

    fn planner_run(storage: &Storage) -> ScriptedRun {
        let wip = storage.wip_dir();
        says_after(PLAN, move |_| write_temp_plan_in(&wip))
    }

    fn approved_loop_runs(storage: &Storage) -> Vec<ScriptedRun> {
        vec![
            planner_run(storage),
            says("<DONE>done</DONE>"),
            says("<APPROVED>ok</APPROVED>"),
        ]
    }

    /// Collect events until `stop` matches one, with a hard timeout
    async fn collect_until(
        rx: &mut mpsc::Receiver<Event>,
        stop: impl Fn(&Event) -> bool,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for events")
                .expect("event stream ended early");
            let done = stop(&event);
            events.push(event);
            if done {
                return events;
            }
        }
    }

    fn supervisor(storage: &Storage, runs: Vec<ScriptedRun>, config: Config) -> Arc<WatchSupervisor> {
        let adapter = Arc::new(ScriptedAdapter::new(runs));
        Arc::new(WatchSupervisor::new(storage.clone(), adapter, config).with_timing(fast_timing()))
    }

    #[test]
    fn test_content_hash_is_byte_exact_and_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_ne!(content_hash(b"abc\n"), content_hash(b"abc"));
        assert_ne!(content_hash(b""), content_hash(b" "));
    }

    #[tokio::test]
    async fn test_processes_first_item_and_deletes_it() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();
        std::fs::write(storage.backlog_dir().join("001-foo.md"), "task one").unwrap();
        std::fs::write(storage.backlog_dir().join("002-bar.md"), "task two").unwrap();

        let sup = supervisor(&storage, approved_loop_runs(&storage), Config::default());
        let (tx, mut rx) = mpsc::channel(1024);
        let handle = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.run(&tx).await })
        };

        let events = collect_until(&mut rx, |e| e.event_type() == "ItemCompleted").await;
        handle.abort();

        let processing = events.iter().position(|e| e.event_type() == "ProcessingItem").unwrap();
        let completed = events.iter().position(|e| e.event_type() == "ItemCompleted").unwrap();
        assert!(processing < completed);

        match &events[processing] {
            Event::Watch(WatchEvent::ProcessingItem { filename }) => assert_eq!(filename, "001-foo.md"),
            other => panic!("unexpected event {other:?}"),
        }

        assert!(!storage.backlog_dir().join("001-foo.md").exists());
        assert!(storage.backlog_dir().join("002-bar.md").exists());
    }

    #[tokio::test]
    async fn test_loop_events_flow_between_processing_and_completion() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();
        std::fs::write(storage.backlog_dir().join("001-foo.md"), "task").unwrap();

        let sup = supervisor(&storage, approved_loop_runs(&storage), Config::default());
        let (tx, mut rx) = mpsc::channel(1024);
        let handle = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.run(&tx).await })
        };

        let events = collect_until(&mut rx, |e| e.event_type() == "ItemCompleted").await;
        handle.abort();

        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        let processing = types.iter().position(|t| *t == "ProcessingItem").unwrap();
        let approved = types.iter().position(|t| *t == "LoopApproved").unwrap();
        let completed = types.iter().position(|t| *t == "ItemCompleted").unwrap();
        assert!(processing < approved && approved < completed);
    }

    #[tokio::test]
    async fn test_edited_item_is_retained() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();
        let item = storage.backlog_dir().join("a.md");
        std::fs::write(&item, "original").unwrap();

        // The "human" rewrites the task while the reviewer runs.
        let edit_target = item.clone();
        let runs = vec![
            planner_run(&storage),
            says("<DONE>done</DONE>"),
            says_after("<APPROVED>ok</APPROVED>", move |_| {
                std::fs::write(&edit_target, "rewritten by human").unwrap();
            }),
        ];

        let sup = supervisor(&storage, runs, Config::default());
        let (tx, mut rx) = mpsc::channel(1024);
        let handle = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.run(&tx).await })
        };

        let events = collect_until(&mut rx, |e| e.event_type() == "ItemRetained").await;
        handle.abort();

        assert!(!events.iter().any(|e| e.event_type() == "ItemCompleted"));
        assert!(item.exists());
        assert_eq!(std::fs::read_to_string(&item).unwrap(), "rewritten by human");
    }

    #[tokio::test]
    async fn test_spec_issue_outcome_keeps_item_and_blocks() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();
        std::fs::write(storage.backlog_dir().join("a.md"), "task").unwrap();

        let runs = vec![says("<SPEC_ISSUE>unclear</SPEC_ISSUE>")];
        let sup = supervisor(&storage, runs, Config::default());
        let (tx, mut rx) = mpsc::channel(1024);
        let handle = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.run(&tx).await })
        };

        let events = collect_until(&mut rx, |e| e.event_type() == "LoopSpecIssue").await;

        // The next idle phase observes the filed spec issue and blocks.
        let blocked = collect_until(&mut rx, |e| e.event_type() == "SpecIssueWaiting").await;
        handle.abort();

        assert!(!events.iter().any(|e| e.event_type() == "ItemCompleted"));
        assert!(!blocked.iter().any(|e| e.event_type() == "ProcessingItem"));
        assert!(storage.backlog_dir().join("a.md").exists());
        assert_eq!(visible_files_sorted(&storage.spec_issues_dir()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_interrupted_by_incoming_work() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();

        let mut runs = vec![says_hanging("<TO_BE_DISCUSSED>X</TO_BE_DISCUSSED>")];
        runs.extend(approved_loop_runs(&storage));

        let config = Config {
            audit: true,
            ..Default::default()
        };
        let sup = supervisor(&storage, runs, config);
        let (tx, mut rx) = mpsc::channel(1024);
        let handle = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.run(&tx).await })
        };

        // Idle with an empty backlog: announcement, then the audit begins
        // and files its finding.
        let events = collect_until(&mut rx, |e| e.event_type() == "TbdItemFound").await;
        assert!(events.iter().any(|e| e.event_type() == "BacklogWaiting"));
        assert!(events.iter().any(|e| e.event_type() == "AuditStarted"));

        let tbd_files = visible_files_sorted(&storage.tbd_dir()).unwrap();
        assert_eq!(tbd_files.len(), 1);
        assert_eq!(
            std::fs::read_to_string(storage.tbd_dir().join(&tbd_files[0])).unwrap(),
            "X"
        );

        // Work arrives; after the debounce the audit is interrupted and the
        // item is processed.
        std::fs::write(storage.backlog_dir().join("01-foo.md"), "task").unwrap();
        let events = collect_until(&mut rx, |e| e.event_type() == "ProcessingItem").await;
        handle.abort();

        let interrupted = events.iter().position(|e| e.event_type() == "AuditInterrupted").unwrap();
        let processing = events.iter().position(|e| e.event_type() == "ProcessingItem").unwrap();
        assert!(interrupted < processing);
        assert!(!events.iter().any(|e| e.event_type() == "AuditEnded"));
        // No findings may surface after the interruption.
        assert!(!events[interrupted..].iter().any(|e| e.event_type() == "TbdItemFound"));
    }

    #[tokio::test]
    async fn test_audit_that_finishes_emits_audit_ended() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();

        let mut runs = vec![says("<TO_BE_DISCUSSED>quick finding</TO_BE_DISCUSSED>")];
        runs.extend(approved_loop_runs(&storage));

        let config = Config {
            audit: true,
            ..Default::default()
        };
        let sup = supervisor(&storage, runs, config);
        let (tx, mut rx) = mpsc::channel(1024);
        let handle = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.run(&tx).await })
        };

        // Let the audit run to completion before work arrives.
        let _ = collect_until(&mut rx, |e| e.event_type() == "TbdItemFound").await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(storage.backlog_dir().join("01.md"), "task").unwrap();
        let events = collect_until(&mut rx, |e| e.event_type() == "ProcessingItem").await;
        handle.abort();

        assert!(events.iter().any(|e| e.event_type() == "AuditEnded"));
        assert!(!events.iter().any(|e| e.event_type() == "AuditInterrupted"));
    }
}
