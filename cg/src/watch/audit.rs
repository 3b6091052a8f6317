//! Idle-time audit fiber
//!
//! Best-effort: every failure is swallowed with a warning. The supervisor
//! aborts this task the moment real work arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::agent::{AgentAdapter, SpawnOptions};
use crate::events::{Event, WatchEvent};
use crate::marker::{Extracted, MarkerExtractor, MarkerTag};
use crate::prompts::tasks;
use crate::storage::Storage;

/// Spawn the audit agent after a grace delay
///
/// The grace period avoids audit churn when work arrives immediately after
/// the watcher goes idle.
pub(crate) fn spawn_audit(
    storage: Storage,
    adapter: Arc<dyn AgentAdapter>,
    system_prompt: String,
    grace: Duration,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        debug!("audit: grace elapsed, starting");
        let _ = tx.send(WatchEvent::AuditStarted.into()).await;

        let mut stream = match adapter
            .spawn(SpawnOptions {
                cwd: storage.cwd().to_path_buf(),
                prompt: tasks::AUDIT.to_string(),
                system_prompt: Some(system_prompt),
                dangerously_skip_permissions: true,
                session_id: None,
                resume_session_id: None,
            })
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "audit agent failed to start");
                return;
            }
        };

        let extractor = MarkerExtractor::new(&[MarkerTag::ToBeDiscussed]);
        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "audit agent failed");
                    return;
                }
            };
            for element in extractor.split(event) {
                let Extracted::Marker(marker) = element else {
                    continue;
                };
                let content = marker.content().to_string();
                match storage.write_tbd_item(&content) {
                    Ok(filename) => {
                        debug!(%filename, "audit: tbd item persisted");
                        let _ = tx.send(WatchEvent::TbdItemFound { content, filename }.into()).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "audit: failed to persist tbd item");
                    }
                }
            }
        }
        debug!("audit: agent finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::agent::scripted::{ScriptedAdapter, says};

    #[tokio::test]
    async fn test_audit_persists_and_emits_findings() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();
        let adapter = Arc::new(ScriptedAdapter::new(vec![says(
            "<TO_BE_DISCUSSED>specs drifted</TO_BE_DISCUSSED>",
        )]));

        let (tx, mut rx) = mpsc::channel(16);
        let handle = spawn_audit(storage.clone(), adapter, "audit".into(), Duration::from_millis(1), tx);
        handle.await.unwrap();

        let started = rx.recv().await.unwrap();
        assert_eq!(started.event_type(), "AuditStarted");

        let found = rx.recv().await.unwrap();
        let Event::Watch(WatchEvent::TbdItemFound { content, filename }) = found else {
            panic!("expected TbdItemFound, got {found:?}");
        };
        assert_eq!(content, "specs drifted");

        let persisted = std::fs::read_to_string(storage.tbd_dir().join(&filename)).unwrap();
        assert_eq!(persisted, "specs drifted");
    }

    #[tokio::test]
    async fn test_audit_failure_is_swallowed() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();
        // No scripted runs left -> spawn fails; the task must still finish
        // cleanly without panicking.
        let adapter = Arc::new(ScriptedAdapter::new(vec![]));

        let (tx, mut rx) = mpsc::channel(16);
        let handle = spawn_audit(storage, adapter, "audit".into(), Duration::from_millis(1), tx);
        handle.await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event_type(), "AuditStarted");
        assert!(rx.recv().await.is_none());
    }
}
