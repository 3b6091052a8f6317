//! Git integration for auto-commit, push, and review diffs
//!
//! Shells out to `git` in the workspace. Failures here never kill a loop
//! run: callers turn them into `CommitFailed`/`PushFailed` events or skip
//! the advisory diff.

use std::path::Path;

use tracing::debug;

/// Run git with the given arguments; Ok(trimmed stdout) on exit 0
async fn git(cwd: &Path, args: &[&str]) -> Result<String, String> {
    debug!(?args, ?cwd, "git: called");
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| format!("failed to run git: {e}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("git {} failed: {}", args.first().unwrap_or(&"?"), stderr.trim()))
    }
}

/// HEAD commit hash, if the workspace is a git repository with history
pub async fn rev_parse_head(cwd: &Path) -> Option<String> {
    git(cwd, &["rev-parse", "HEAD"]).await.ok()
}

/// Advisory diff of everything since the baseline commit
pub async fn diff_since(cwd: &Path, baseline: &str) -> Option<String> {
    git(cwd, &["diff", &format!("{baseline}..HEAD")]).await.ok()
}

/// Stage and commit everything except the specs folder
///
/// Returns Ok(None) when there was nothing to commit, Ok(short hash) on a
/// landed commit, and Err(message) on any failing step.
pub async fn auto_commit(cwd: &Path, specs_path: &str, message: &str) -> Result<Option<String>, String> {
    debug!(?cwd, specs_path, "auto_commit: called");

    git(cwd, &["add", "-A", "--", ".", &format!(":!{specs_path}")]).await?;

    // diff --cached --quiet exits 0 when nothing is staged.
    if git(cwd, &["diff", "--cached", "--quiet"]).await.is_ok() {
        debug!("auto_commit: nothing staged, skipping");
        return Ok(None);
    }

    git(cwd, &["commit", "-m", message]).await?;
    let hash = git(cwd, &["rev-parse", "--short", "HEAD"]).await?;
    Ok(Some(hash))
}

/// Push HEAD to the given remote branch
pub async fn push(cwd: &Path, remote: &str, branch: &str) -> Result<(), String> {
    git(cwd, &["push", remote, &format!("HEAD:{branch}")]).await.map(|_| ())
}

/// Split a `remote/branch` push target
pub fn split_push_target(target: &str) -> Option<(&str, &str)> {
    let (remote, branch) = target.split_once('/')?;
    if remote.is_empty() || branch.is_empty() {
        return None;
    }
    Some((remote, branch))
}
