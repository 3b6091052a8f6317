//! Check and setup command execution
//!
//! Both commands run as `sh -c <command>` in the workspace and never fail
//! the loop: a nonzero exit code (or even a spawn failure) just becomes
//! output handed to the next agent phase.

use std::path::Path;

use tracing::debug;

/// Combined result of a shell command run
#[derive(Clone, Debug)]
pub struct CommandOutput {
    /// stdout followed by stderr
    pub output: String,
    /// Exit code; -1 when the process was killed by a signal or never ran
    pub exit_code: i32,
}

/// Run a shell command, capturing combined output
pub async fn run_shell_command(command: &str, cwd: &Path) -> CommandOutput {
    debug!(%command, ?cwd, "run_shell_command: called");

    let result = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .output()
        .await;

    match result {
        Ok(output) => {
            let exit_code = output.status.code().unwrap_or(-1);
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            debug!(exit_code, output_len = combined.len(), "run_shell_command: command completed");
            CommandOutput {
                output: combined,
                exit_code,
            }
        }
        Err(e) => {
            debug!(error = %e, "run_shell_command: spawn failed");
            CommandOutput {
                output: format!("failed to run command: {e}"),
                exit_code: -1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let temp = tempdir().unwrap();
        let result = run_shell_command("echo ok", temp.path()).await;
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("ok"));
    }

    #[tokio::test]
    async fn test_failure_is_not_an_error() {
        let temp = tempdir().unwrap();
        let result = run_shell_command("echo broken >&2; exit 3", temp.path()).await;
        assert_eq!(result.exit_code, 3);
        assert!(result.output.contains("broken"));
    }

    #[tokio::test]
    async fn test_stdout_precedes_stderr() {
        let temp = tempdir().unwrap();
        let result = run_shell_command("echo out; echo err >&2", temp.path()).await;
        let out_at = result.output.find("out").unwrap();
        let err_at = result.output.find("err").unwrap();
        assert!(out_at < err_at);
    }

    #[tokio::test]
    async fn test_empty_command_succeeds() {
        let temp = tempdir().unwrap();
        let result = run_shell_command("", temp.path()).await;
        assert_eq!(result.exit_code, 0);
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn test_runs_in_given_directory() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "here").unwrap();
        let result = run_shell_command("cat marker.txt", temp.path()).await;
        assert!(result.output.contains("here"));
    }
}
