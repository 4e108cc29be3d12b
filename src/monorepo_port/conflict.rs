//! Conflict Continue: advances an in-progress `am` session after the
//! operator has resolved (or staged) a conflict.

use std::path::Path;
use std::process::Command;

use crate::error::HappyError;
use crate::shell_exec;

use super::preflight;

const CONFLICT_MARKERS: [&str; 3] = ["<<<<<<< ", ">>>>>>> ", "||||||| "];

/// Outcome of a successful continue: whether the am session fully drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueResult {
    /// `am --continue` applied this patch; more patches may remain.
    Advanced,
    /// The am session is no longer in progress.
    Drained,
}

/// Advance the in-progress `am` session in `target_dir`.
///
/// Without `stage`: refuse if unmerged files exist, naming them and the
/// exact `git add` command. With `stage`: refuse if any candidate still
/// contains conflict markers; otherwise `git add -A` then `am --continue`.
pub fn continue_am(target_dir: &Path, stage: bool) -> anyhow::Result<ContinueResult> {
    let unmerged = preflight::conflicted_files(target_dir)?;

    if !unmerged.is_empty() {
        if !stage {
            let files = unmerged.join(", ");
            let add_cmd = unmerged
                .iter()
                .map(|f| shell_escape::escape(f.into()))
                .collect::<Vec<_>>()
                .join(" ");
            return Err(HappyError::StateConflict {
                repo_root: target_dir.to_path_buf(),
                hint: format!("unmerged: {files}; run `git add {add_cmd}` then retry with --stage"),
            }
            .into());
        }

        for file in &unmerged {
            if file_has_conflict_markers(target_dir, file)? {
                return Err(HappyError::StateConflict {
                    repo_root: target_dir.to_path_buf(),
                    hint: format!("{file} still contains conflict markers; resolve them before continuing"),
                }
                .into());
            }
        }

        let mut add_cmd = Command::new("git");
        add_cmd.current_dir(target_dir).args(["add", "-A"]);
        shell_exec::run_checked(&mut add_cmd, Some("conflict-stage"))?;
    }

    let mut continue_cmd = Command::new("git");
    continue_cmd.current_dir(target_dir).args(["am", "--continue"]);
    let out = shell_exec::run(&mut continue_cmd, Some("am-continue"))?;

    if !out.success() {
        let remaining = preflight::conflicted_files(target_dir)?;
        return Err(HappyError::StateConflict {
            repo_root: target_dir.to_path_buf(),
            hint: format!("am --continue failed; remaining conflicts: {}", remaining.join(", ")),
        }
        .into());
    }

    if preflight::am_in_progress(target_dir)? {
        Ok(ContinueResult::Advanced)
    } else {
        Ok(ContinueResult::Drained)
    }
}

/// Skip the current patch in an in-progress `am` session (`am --skip`).
pub fn skip_am(target_dir: &Path) -> anyhow::Result<ContinueResult> {
    let mut cmd = Command::new("git");
    cmd.current_dir(target_dir).args(["am", "--skip"]);
    shell_exec::run_checked(&mut cmd, Some("am-skip"))?;

    if preflight::am_in_progress(target_dir)? {
        Ok(ContinueResult::Advanced)
    } else {
        Ok(ContinueResult::Drained)
    }
}

/// Abort the in-progress `am` session (`am --abort`).
pub fn abort_am(target_dir: &Path) -> anyhow::Result<()> {
    let mut cmd = Command::new("git");
    cmd.current_dir(target_dir).args(["am", "--abort"]);
    shell_exec::run_checked(&mut cmd, Some("am-abort"))?;
    Ok(())
}

fn file_has_conflict_markers(target_dir: &Path, relative_path: &str) -> anyhow::Result<bool> {
    let contents = std::fs::read_to_string(target_dir.join(relative_path)).unwrap_or_default();
    Ok(contents.lines().any(|line| CONFLICT_MARKERS.iter().any(|m| line.starts_with(m))))
}
