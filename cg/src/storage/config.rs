//! Configuration record
//!
//! Persisted as JSON at `<root>/.cuggino.json`. Every field has a default,
//! an empty object is valid, unknown keys are ignored, and malformed JSON
//! reduces to the defaults rather than failing.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CONFIG_FILE, StorageError};

/// Notification channel selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyMode {
    #[default]
    None,
    OsxNotification,
}

/// Workspace configuration record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Directory of spec files handed to the agents (task-writable)
    pub specs_path: String,
    /// Iteration budget per loop run
    pub max_iterations: u32,
    /// One-time command run before the first planning phase
    pub setup_command: Option<String>,
    /// Command run before each implementing/reviewing pass
    pub check_command: Option<String>,
    /// Auto-commit after each implementing pass
    pub commit: bool,
    /// `remote/branch` to push to after a successful auto-commit
    pub push: Option<String>,
    /// Run the low-priority audit agent while the watcher is idle
    pub audit: bool,
    /// Desktop notification channel for idle transitions
    pub notify: NotifyMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            specs_path: ".specs".to_string(),
            max_iterations: 10,
            setup_command: None,
            check_command: None,
            commit: false,
            push: None,
            audit: false,
            notify: NotifyMode::None,
        }
    }
}

/// Read the configuration record from the workspace root
///
/// A missing or malformed file yields the fully-populated defaults.
pub fn read_config(cwd: &Path) -> Config {
    let path = cwd.join(CONFIG_FILE);
    debug!(?path, "read_config: called");

    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(?path, error = %e, "read_config: no readable config, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!(?path, error = %e, "Malformed configuration, using defaults");
            Config::default()
        }
    }
}

/// Serialize the configuration record to the workspace root
pub fn write_config(cwd: &Path, config: &Config) -> Result<(), StorageError> {
    let path = cwd.join(CONFIG_FILE);
    debug!(?path, "write_config: called");

    let mut json = serde_json::to_string_pretty(config).map_err(|e| StorageError {
        operation: "write-config",
        source: std::io::Error::other(e),
    })?;
    json.push('\n');

    fs::write(&path, json).map_err(|source| StorageError {
        operation: "write-config",
        source,
    })
}
