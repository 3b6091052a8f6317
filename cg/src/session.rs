//! Per-run session scratch space
//!
//! Each loop run owns five files under `.cuggino/wip/`, keyed by a fresh
//! time-ordered id:
//!
//! - `<id>.md`          session transcript (plan + progress log + markers)
//! - `<id>.review.md`   reviewer feedback carried into the next iteration
//! - `<id>.plan.md`     temp plan the planner writes before it is committed
//! - `<id>.check.txt`   latest check command output
//! - `<id>.setup.txt`   setup command output
//!
//! The fileset exists only while the run is alive: dropping the session
//! removes all five files regardless of how the run ended.

use std::fs;
use std::path::PathBuf;

use chrono::{Local, SecondsFormat};
use thiserror::Error;
use tracing::debug;

use crate::events::MarkerEvent;
use crate::storage::Storage;

/// Failure of a session operation
#[derive(Debug, Error)]
#[error("session operation '{operation}' failed for {session_id}: {source}")]
pub struct SessionError {
    pub operation: &'static str,
    pub session_id: String,
    #[source]
    pub source: std::io::Error,
}

/// Scratch files of one loop run
#[derive(Debug)]
pub struct Session {
    id: String,
    transcript: PathBuf,
    review: PathBuf,
    temp_plan: PathBuf,
    check_output: PathBuf,
    setup_output: PathBuf,
}

impl Session {
    /// Create the session fileset for a fresh id
    ///
    /// Materializes an empty transcript so the implementer always has a
    /// file to read, even when planning produced nothing.
    pub fn create(storage: &Storage, id: impl Into<String>) -> Result<Self, SessionError> {
        let id = id.into();
        let wip = storage.wip_dir();
        debug!(%id, ?wip, "Session::create: called");

        let session = Self {
            transcript: wip.join(format!("{id}.md")),
            review: wip.join(format!("{id}.review.md")),
            temp_plan: wip.join(format!("{id}.plan.md")),
            check_output: wip.join(format!("{id}.check.txt")),
            setup_output: wip.join(format!("{id}.setup.txt")),
            id,
        };

        fs::write(&session.transcript, "").map_err(session.wrap("create-transcript"))?;
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transcript_path(&self) -> &PathBuf {
        &self.transcript
    }

    pub fn review_path(&self) -> &PathBuf {
        &self.review
    }

    pub fn temp_plan_path(&self) -> &PathBuf {
        &self.temp_plan
    }

    pub fn check_output_path(&self) -> &PathBuf {
        &self.check_output
    }

    pub fn setup_output_path(&self) -> &PathBuf {
        &self.setup_output
    }

    /// Append a timestamped marker block to the transcript
    ///
    /// Only the loop appends here and phases are serial, so no cross-writer
    /// atomicity is needed.
    pub fn append_marker(&self, marker: &MarkerEvent) -> Result<(), SessionError> {
        debug!(session_id = %self.id, tag = marker.tag(), "Session::append_marker: called");
        let mut transcript = fs::read_to_string(&self.transcript).map_err(self.wrap("append-marker"))?;
        let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        transcript.push_str(&format!(
            "\n## {timestamp} ({tag})\n\n{content}\n",
            tag = marker.tag(),
            content = marker.content(),
        ));
        fs::write(&self.transcript, transcript).map_err(self.wrap("append-marker"))
    }

    /// Overwrite the review file with the reviewer's feedback
    pub fn write_review(&self, text: &str) -> Result<(), SessionError> {
        debug!(session_id = %self.id, "Session::write_review: called");
        fs::write(&self.review, text).map_err(self.wrap("write-review"))
    }

    /// Remove the review file if present
    pub fn clear_review(&self) -> Result<(), SessionError> {
        debug!(session_id = %self.id, "Session::clear_review: called");
        match fs::remove_file(&self.review) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.wrap("clear-review")(e)),
        }
    }

    /// Read the review file, if one exists
    pub fn read_review(&self) -> Result<Option<String>, SessionError> {
        debug!(session_id = %self.id, "Session::read_review: called");
        match fs::read_to_string(&self.review) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.wrap("read-review")(e)),
        }
    }

    /// Capture the latest check command output
    pub fn write_check_output(&self, output: &str) -> Result<(), SessionError> {
        debug!(session_id = %self.id, "Session::write_check_output: called");
        fs::write(&self.check_output, output).map_err(self.wrap("write-check-output"))
    }

    /// Capture the setup command output
    pub fn write_setup_output(&self, output: &str) -> Result<(), SessionError> {
        debug!(session_id = %self.id, "Session::write_setup_output: called");
        fs::write(&self.setup_output, output).map_err(self.wrap("write-setup-output"))
    }

    /// Move the temp plan into the transcript
    ///
    /// The implementer reads its plan from the transcript, so this must run
    /// between the planning and implementing phases. The transcript becomes
    /// the plan followed by an empty progress log; the temp plan is deleted.
    pub fn commit_temp_plan(&self) -> Result<(), SessionError> {
        debug!(session_id = %self.id, "Session::commit_temp_plan: called");
        let plan = fs::read_to_string(&self.temp_plan).map_err(self.wrap("commit-temp-plan"))?;
        fs::write(&self.transcript, format!("{plan}\n\n# Progress Log\n")).map_err(self.wrap("commit-temp-plan"))?;
        fs::remove_file(&self.temp_plan).map_err(self.wrap("commit-temp-plan"))
    }

    fn wrap(&self, operation: &'static str) -> impl FnOnce(std::io::Error) -> SessionError {
        let session_id = self.id.clone();
        move |source| SessionError {
            operation,
            session_id,
            source,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(session_id = %self.id, "Session::drop: removing session files");
        for path in [
            &self.transcript,
            &self.review,
            &self.temp_plan,
            &self.check_output,
            &self.setup_output,
        ] {
            // Best effort; missing files are the normal case.
            let _ = fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::new_entry_id;
    use tempfile::tempdir;

    fn make_storage(dir: &std::path::Path) -> Storage {
        Storage::init(dir).unwrap()
    }

    #[test]
    fn test_create_materializes_empty_transcript() {
        let temp = tempdir().unwrap();
        let storage = make_storage(temp.path());
        let session = Session::create(&storage, new_entry_id()).unwrap();

        assert!(session.transcript_path().exists());
        assert_eq!(fs::read_to_string(session.transcript_path()).unwrap(), "");
        assert!(!session.review_path().exists());
    }

    #[test]
    fn test_append_marker_format() {
        let temp = tempdir().unwrap();
        let storage = make_storage(temp.path());
        let session = Session::create(&storage, new_entry_id()).unwrap();

        session
            .append_marker(&MarkerEvent::Progress {
                content: "phase 1 done".into(),
            })
            .unwrap();

        let transcript = fs::read_to_string(session.transcript_path()).unwrap();
        assert!(transcript.contains("(PROGRESS)"));
        assert!(transcript.contains("\n\nphase 1 done\n"));
        assert!(transcript.starts_with("\n## "));
    }

    #[test]
    fn test_append_marker_accumulates() {
        let temp = tempdir().unwrap();
        let storage = make_storage(temp.path());
        let session = Session::create(&storage, new_entry_id()).unwrap();

        session.append_marker(&MarkerEvent::Note { content: "a".into() }).unwrap();
        session.append_marker(&MarkerEvent::Done { content: "b".into() }).unwrap();

        let transcript = fs::read_to_string(session.transcript_path()).unwrap();
        let note_at = transcript.find("(NOTE)").unwrap();
        let done_at = transcript.find("(DONE)").unwrap();
        assert!(note_at < done_at);
    }

    #[test]
    fn test_review_round_trip_and_clear() {
        let temp = tempdir().unwrap();
        let storage = make_storage(temp.path());
        let session = Session::create(&storage, new_entry_id()).unwrap();

        assert_eq!(session.read_review().unwrap(), None);

        session.write_review("fix the tests").unwrap();
        assert_eq!(session.read_review().unwrap().as_deref(), Some("fix the tests"));

        session.clear_review().unwrap();
        assert_eq!(session.read_review().unwrap(), None);

        // Clearing an absent review is fine
        session.clear_review().unwrap();
    }

    #[test]
    fn test_commit_temp_plan_moves_plan_into_transcript() {
        let temp = tempdir().unwrap();
        let storage = make_storage(temp.path());
        let session = Session::create(&storage, new_entry_id()).unwrap();

        fs::write(session.temp_plan_path(), "# The Plan\n- step one").unwrap();
        session.commit_temp_plan().unwrap();

        let transcript = fs::read_to_string(session.transcript_path()).unwrap();
        assert!(transcript.starts_with("# The Plan\n- step one"));
        assert!(transcript.ends_with("\n\n# Progress Log\n"));
        assert!(!session.temp_plan_path().exists());
    }

    #[test]
    fn test_commit_temp_plan_without_plan_fails() {
        let temp = tempdir().unwrap();
        let storage = make_storage(temp.path());
        let session = Session::create(&storage, new_entry_id()).unwrap();

        let err = session.commit_temp_plan().unwrap_err();
        assert_eq!(err.operation, "commit-temp-plan");
    }

    #[test]
    fn test_drop_removes_all_files() {
        let temp = tempdir().unwrap();
        let storage = make_storage(temp.path());
        let session = Session::create(&storage, new_entry_id()).unwrap();

        fs::write(session.review_path(), "r").unwrap();
        fs::write(session.temp_plan_path(), "p").unwrap();
        fs::write(session.check_output_path(), "c").unwrap();
        fs::write(session.setup_output_path(), "s").unwrap();

        let paths = [
            session.transcript_path().clone(),
            session.review_path().clone(),
            session.temp_plan_path().clone(),
            session.check_output_path().clone(),
            session.setup_output_path().clone(),
        ];

        drop(session);

        for path in &paths {
            assert!(!path.exists(), "{} should be removed", path.display());
        }
    }
}
