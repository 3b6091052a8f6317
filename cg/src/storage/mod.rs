//! Workspace storage layout
//!
//! Storage owns the on-disk tree under the workspace root:
//!
//! ```text
//! <root>/.cuggino/wip/          per-run session files
//! <root>/.cuggino/spec-issues/  machine-filed ambiguities (block watch)
//! <root>/.cuggino/backlog/      human-ordered task queue
//! <root>/.cuggino/tbd/          audit findings for human review
//! <root>/.cuggino/memory.md     human-editable agent memory
//! <root>/.cuggino.json          configuration record
//! ```
//!
//! System-written filenames are fresh UUIDv7 values so lexicographic order
//! matches creation order.

mod config;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub use config::{Config, NotifyMode, read_config, write_config};

/// Directory under the workspace root owned by cuggino
pub const BASE_DIR: &str = ".cuggino";

/// Configuration file at the workspace root
pub const CONFIG_FILE: &str = ".cuggino.json";

/// Failure of a storage operation
#[derive(Debug, Error)]
#[error("storage operation '{operation}' failed: {source}")]
pub struct StorageError {
    pub operation: &'static str,
    #[source]
    pub source: std::io::Error,
}

impl StorageError {
    fn wrap(operation: &'static str) -> impl FnOnce(std::io::Error) -> StorageError {
        move |source| StorageError { operation, source }
    }
}

/// Generate a fresh time-ordered identifier
///
/// UUIDv7 embeds a millisecond timestamp in its high bits, so sorting the
/// resulting filenames lexicographically reproduces creation order.
pub fn new_entry_id() -> String {
    Uuid::now_v7().to_string()
}

/// Handle on the workspace storage tree
#[derive(Clone, Debug)]
pub struct Storage {
    cwd: PathBuf,
    base: PathBuf,
}

impl Storage {
    /// Open the storage tree rooted at `cwd`, creating it if absent
    pub fn init(cwd: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let cwd = cwd.into();
        let base = cwd.join(BASE_DIR);
        debug!(?base, "Storage::init: called");

        for dir in ["wip", "spec-issues", "backlog", "tbd"] {
            fs::create_dir_all(base.join(dir)).map_err(StorageError::wrap("create-layout"))?;
        }

        Ok(Self { cwd, base })
    }

    /// The workspace root the agents run in
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn wip_dir(&self) -> PathBuf {
        self.base.join("wip")
    }

    pub fn spec_issues_dir(&self) -> PathBuf {
        self.base.join("spec-issues")
    }

    pub fn backlog_dir(&self) -> PathBuf {
        self.base.join("backlog")
    }

    pub fn tbd_dir(&self) -> PathBuf {
        self.base.join("tbd")
    }

    /// Human-editable memory file surfaced to the agents
    pub fn memory_path(&self) -> PathBuf {
        self.base.join("memory.md")
    }

    /// Path of the configuration record
    pub fn config_path(&self) -> PathBuf {
        self.cwd.join(CONFIG_FILE)
    }

    /// Persist a spec issue; returns the generated filename
    pub fn write_spec_issue(&self, content: &str) -> Result<String, StorageError> {
        self.write_entry(&self.spec_issues_dir(), content, "write-spec-issue")
    }

    /// Persist an audit finding; returns the generated filename
    pub fn write_tbd_item(&self, content: &str) -> Result<String, StorageError> {
        self.write_entry(&self.tbd_dir(), content, "write-tbd-item")
    }

    fn write_entry(&self, dir: &Path, content: &str, operation: &'static str) -> Result<String, StorageError> {
        let filename = format!("{}.md", new_entry_id());
        debug!(?dir, %filename, operation, "Storage::write_entry: called");
        fs::write(dir.join(&filename), content).map_err(StorageError::wrap(operation))?;
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_layout() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();

        assert!(storage.wip_dir().is_dir());
        assert!(storage.spec_issues_dir().is_dir());
        assert!(storage.backlog_dir().is_dir());
        assert!(storage.tbd_dir().is_dir());
    }

    #[test]
    fn test_init_is_idempotent() {
        let temp = tempdir().unwrap();
        Storage::init(temp.path()).unwrap();
        Storage::init(temp.path()).unwrap();
    }

    #[test]
    fn test_write_spec_issue_round_trip() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();

        let filename = storage.write_spec_issue("clarify X").unwrap();
        assert!(filename.ends_with(".md"));

        let content = std::fs::read_to_string(storage.spec_issues_dir().join(&filename)).unwrap();
        assert_eq!(content, "clarify X");
    }

    #[test]
    fn test_write_tbd_item_lands_in_tbd() {
        let temp = tempdir().unwrap();
        let storage = Storage::init(temp.path()).unwrap();

        let filename = storage.write_tbd_item("discuss Y").unwrap();
        assert!(storage.tbd_dir().join(&filename).exists());
        assert!(!storage.spec_issues_dir().join(&filename).exists());
    }

    #[test]
    fn test_entry_ids_sort_by_creation() {
        let a = new_entry_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_entry_id();
        assert!(a < b, "{a} should sort before {b}");
    }
}
