//! Idle phase of the watch supervisor
//!
//! Samples the spec-issue and backlog directory counts, re-sampling after
//! any filesystem event in either directory has been followed by a quiet
//! debounce window. The phase ends the first time the pair satisfies
//! `spec_issues == 0 && backlog > 0`. Until then each sub-state entry is
//! announced at most once.

use std::path::Path;

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use super::{WatchError, WatchTiming};
use crate::events::{Event, WatchEvent};
use crate::notify::Notifier;
use crate::storage::Storage;

/// Announced idle sub-states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IdleState {
    SpecIssueWaiting,
    BacklogWaiting,
}

/// Non-hidden file names in a directory, ASCII-sorted
pub(crate) fn visible_files_sorted(dir: &Path) -> Result<Vec<String>, WatchError> {
    let entries = std::fs::read_dir(dir).map_err(|e| WatchError::failed(format!("cannot read {}: {e}", dir.display())))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

fn sample(storage: &Storage) -> Result<(usize, usize), WatchError> {
    let spec_issues = visible_files_sorted(&storage.spec_issues_dir())?.len();
    let backlog = visible_files_sorted(&storage.backlog_dir())?.len();
    debug!(spec_issues, backlog, "idle sample");
    Ok((spec_issues, backlog))
}

/// Block until the backlog has work and no spec issues are pending
pub(crate) async fn wait_for_work(
    storage: &Storage,
    timing: &WatchTiming,
    notifier: &Notifier,
    tx: &mpsc::Sender<Event>,
) -> Result<(), WatchError> {
    debug!("wait_for_work: called");

    // Forward raw filesystem events into the async world; the debounce
    // below turns bursts into single re-samples.
    let (fs_tx, mut fs_rx) = mpsc::channel::<()>(16);
    let mut watcher = notify::recommended_watcher(move |result: Result<notify::Event, notify::Error>| {
        if result.is_ok() {
            let _ = fs_tx.try_send(());
        }
    })
    .map_err(|e| WatchError::failed(format!("cannot create filesystem watcher: {e}")))?;

    for dir in [storage.spec_issues_dir(), storage.backlog_dir()] {
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::failed(format!("cannot watch {}: {e}", dir.display())))?;
    }

    let mut last_pair: Option<(usize, usize)> = None;
    let mut announced: Option<IdleState> = None;

    loop {
        let pair = sample(storage)?;
        let pair_changed = last_pair != Some(pair);
        last_pair = Some(pair);

        let (spec_issues, backlog) = pair;
        if spec_issues == 0 && backlog > 0 {
            debug!(backlog, "wait_for_work: work available");
            return Ok(());
        }

        if pair_changed {
            let state = if spec_issues > 0 {
                IdleState::SpecIssueWaiting
            } else {
                IdleState::BacklogWaiting
            };
            // Once per sub-state entry, however often the counts wiggle.
            if announced != Some(state) {
                announced = Some(state);
                match state {
                    IdleState::SpecIssueWaiting => {
                        let _ = tx.send(WatchEvent::SpecIssueWaiting.into()).await;
                        notifier.notify("cuggino", "Spec issues are waiting for your review");
                    }
                    IdleState::BacklogWaiting => {
                        let _ = tx.send(WatchEvent::BacklogWaiting.into()).await;
                        notifier.notify("cuggino", "Backlog is empty, waiting for work");
                    }
                }
            }
        }

        // Sleep until something changes on disk...
        if fs_rx.recv().await.is_none() {
            return Err(WatchError::failed("filesystem watcher closed"));
        }
        // ...then wait for a full debounce window of quiescence.
        loop {
            match tokio::time::timeout(timing.debounce_window, fs_rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return Err(WatchError::failed("filesystem watcher closed")),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::tempdir;

    use crate::storage::NotifyMode;

    fn fast_timing() -> WatchTiming {
        WatchTiming {
            debounce_window: Duration::from_millis(50),
            audit_grace: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_visible_files_sorted_excludes_hidden() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("b.md"), "").unwrap();
        std::fs::write(temp.path().join("a.md"), "").unwrap();
        std::fs::write(temp.path().join(".hidden"), "").unwrap();
        std::fs::create_dir(temp.path().join("subdir")).unwrap();

        let names = visible_files_sorted(temp.path()).unwrap();
        assert_eq!(names, vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn test_returns_immediately_when_work_is_ready() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();
        std::fs::write(storage.backlog_dir().join("001.md"), "task").unwrap();

        let (tx, _rx) = mpsc::channel(64);
        let notifier = Notifier::new(NotifyMode::None);
        tokio::time::timeout(
            Duration::from_secs(2),
            wait_for_work(&storage, &fast_timing(), &notifier, &tx),
        )
        .await
        .expect("should not block")
        .unwrap();
    }

    #[tokio::test]
    async fn test_announces_backlog_waiting_once() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let notifier = Notifier::new(NotifyMode::None);

        let handle = {
            let storage = storage.clone();
            let timing = fast_timing();
            tokio::spawn(async move { wait_for_work(&storage, &timing, &notifier, &tx).await })
        };

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.event_type(), "BacklogWaiting");

        // Release the idle phase.
        std::fs::write(storage.backlog_dir().join("001.md"), "task").unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("idle phase should end")
            .unwrap()
            .unwrap();

        // No second announcement happened in between.
        let mut extra = 0;
        while let Ok(event) = rx.try_recv() {
            if event.event_type() == "BacklogWaiting" {
                extra += 1;
            }
        }
        assert_eq!(extra, 0);
    }

    #[tokio::test]
    async fn test_spec_issues_block_work_and_announce_once() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();
        std::fs::write(storage.spec_issues_dir().join("issue-1.md"), "x").unwrap();
        std::fs::write(storage.backlog_dir().join("001.md"), "task").unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let notifier = Notifier::new(NotifyMode::None);

        let handle = {
            let storage = storage.clone();
            let timing = fast_timing();
            tokio::spawn(async move { wait_for_work(&storage, &timing, &notifier, &tx).await })
        };

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.event_type(), "SpecIssueWaiting");

        // A second spec issue changes the pair but not the sub-state.
        std::fs::write(storage.spec_issues_dir().join("issue-2.md"), "y").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_finished(), "spec issues must keep blocking");

        // Clearing the issues releases the phase (backlog already has work).
        std::fs::remove_file(storage.spec_issues_dir().join("issue-1.md")).unwrap();
        std::fs::remove_file(storage.spec_issues_dir().join("issue-2.md")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("idle phase should end")
            .unwrap()
            .unwrap();

        let mut announcements = 0;
        while let Ok(event) = rx.try_recv() {
            if event.event_type() == "SpecIssueWaiting" {
                announcements += 1;
            }
        }
        assert_eq!(announcements, 0, "only the initial announcement is allowed");
    }
}
