//! Preflight: dry conflict detection in a disposable, detached worktree.
//! Never mutates the real checkout; the worktree is disposed unconditionally.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;

use crate::shell_exec;

use super::apply;

static NONCE: AtomicU64 = AtomicU64::new(0);

/// First conflicting patch and the files it conflicts on, if preflight found one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstConflict {
    pub current_patch: PathBuf,
    pub conflicted_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightOutcome {
    Ok,
    Conflict(FirstConflict),
}

/// Create a detached worktree at `base`, named `<label>-<head_short>-<nonce>`
/// under `components_dir/.worktrees-preflight/`, guaranteed to be unique
/// within this process's lifetime.
pub fn create_detached_worktree(
    repo_dir: &Path,
    components_dir: &Path,
    label: &str,
    base: &str,
) -> anyhow::Result<PathBuf> {
    let head_short = resolve_short_sha(repo_dir, base)?;
    let nonce = NONCE.fetch_add(1, Ordering::SeqCst);
    let dir_name = format!("{label}-{head_short}-{nonce}");
    let worktree_path = components_dir.join(".worktrees-preflight").join(dir_name);

    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cmd = Command::new("git");
    cmd.current_dir(repo_dir)
        .arg("worktree")
        .arg("add")
        .arg("--detach")
        .arg(&worktree_path)
        .arg(base);
    shell_exec::run_checked(&mut cmd, Some("preflight-worktree"))?;

    Ok(worktree_path)
}

fn resolve_short_sha(repo_dir: &Path, rev: &str) -> anyhow::Result<String> {
    let mut cmd = Command::new("git");
    cmd.current_dir(repo_dir).args(["rev-parse", "--short", rev]);
    let out = shell_exec::run_checked(&mut cmd, Some("preflight-rev-parse"))?;
    Ok(out.stdout.trim().to_string())
}

/// Unconditionally remove the detached preflight worktree, ignoring errors
/// beyond logging — disposal must never fail the overall preflight.
pub fn dispose(repo_dir: &Path, worktree_path: &Path) {
    let mut cmd = Command::new("git");
    cmd.current_dir(repo_dir).arg("worktree").arg("remove").arg("--force").arg(worktree_path);
    if let Err(e) = shell_exec::run(&mut cmd, Some("preflight-dispose")) {
        log::warn!("failed to dispose preflight worktree {}: {e}", worktree_path.display());
    }
    let _ = std::fs::remove_dir_all(worktree_path);
}

/// Whether an `am` session is in progress in `dir` (rebase-apply dir present).
pub fn am_in_progress(dir: &Path) -> anyhow::Result<bool> {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir).args(["rev-parse", "--git-path", "rebase-apply"]);
    let out = shell_exec::run_checked(&mut cmd, Some("am-in-progress-check"))?;
    Ok(Path::new(out.stdout.trim()).is_dir())
}

/// Unmerged files in `dir`, via `git status --porcelain=v1` ('U' code).
pub fn conflicted_files(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir).args(["status", "--porcelain=v1"]);
    let out = shell_exec::run_checked(&mut cmd, Some("conflicted-files"))?;
    Ok(out
        .stdout
        .lines()
        .filter(|line| line.starts_with('U') || line.get(1..2) == Some("U"))
        .filter_map(|line| line.get(3..).map(str::to_string))
        .collect())
}

/// Report the first conflict after an apply loop left `am` in progress.
pub fn report_conflict(dir: &Path) -> anyhow::Result<Option<FirstConflict>> {
    let Some(current_patch) = apply::show_current_patch(dir)? else {
        return Ok(None);
    };
    let conflicted = conflicted_files(dir)?;
    Ok(Some(FirstConflict { current_patch, conflicted_files: conflicted }))
}
