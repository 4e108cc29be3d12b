//! The per-patch Apply Protocol: pre-check, already-applied detection,
//! identical-new-file detection, 3-way `am` apply with fallback, and
//! stderr-based failure classification.

use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;

use crate::error::PatchFailureKind;
use crate::shell_exec::{self, RunOutput};

use super::patch::{self, Patch};

/// The outcome of applying one patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Applied,
    SkippedAlreadyApplied,
    SkippedAlreadyExistsIdentical,
    Failed { kind: PatchFailureKind, paths: Vec<String>, apply_check_err: Option<String>, err: Option<String> },
}

impl Finding {
    pub fn is_failure(&self) -> bool {
        matches!(self, Finding::Failed { .. })
    }
}

/// Configuration for one apply attempt.
pub struct ApplyOptions<'a> {
    pub target_dir: &'a Path,
    pub directory_prefix: Option<&'a str>,
    pub use_3way: bool,
}

/// Run the full apply protocol for one patch file's content against the
/// target repo, returning the classified [`Finding`].
pub fn apply_patch(patch_path: &Path, patch_text: &str, opts: &ApplyOptions) -> anyhow::Result<Finding> {
    if let Some(err) = pre_check(patch_path, opts)? {
        if already_applied(patch_path, opts)? {
            return Ok(Finding::SkippedAlreadyApplied);
        }

        let parsed = patch::parse(patch_text);
        if parsed.all_pure_new_files() {
            let matches = parsed
                .files
                .iter()
                .all(|f| file_is_identical(opts.target_dir, opts.directory_prefix, f));
            if matches {
                return Ok(Finding::SkippedAlreadyExistsIdentical);
            }
        }

        return run_am(patch_path, opts, Some(err));
    }

    run_am(patch_path, opts, None)
}

/// `apply --check`; `Ok(None)` if it succeeds, `Ok(Some(stderr))` if it fails.
fn pre_check(patch_path: &Path, opts: &ApplyOptions) -> anyhow::Result<Option<String>> {
    let mut cmd = Command::new("git");
    cmd.current_dir(opts.target_dir).arg("apply").arg("--check");
    if let Some(prefix) = opts.directory_prefix {
        cmd.arg(format!("--directory={prefix}"));
    }
    cmd.arg(patch_path);
    let out = shell_exec::run(&mut cmd, Some("apply-check"))?;
    Ok(if out.success() { None } else { Some(out.stderr) })
}

fn already_applied(patch_path: &Path, opts: &ApplyOptions) -> anyhow::Result<bool> {
    let mut cmd = Command::new("git");
    cmd.current_dir(opts.target_dir).arg("apply").arg("-R").arg("--check");
    if let Some(prefix) = opts.directory_prefix {
        cmd.arg(format!("--directory={prefix}"));
    }
    cmd.arg(patch_path);
    let out = shell_exec::run(&mut cmd, Some("apply-reverse-check"))?;
    Ok(out.success())
}

fn file_is_identical(target_dir: &Path, directory_prefix: Option<&str>, diff: &patch::FileDiff) -> bool {
    let Some(path) = diff.plus_path.as_ref() else { return false };
    let full_path = match directory_prefix {
        Some(prefix) => target_dir.join(prefix).join(path),
        None => target_dir.join(path),
    };
    let Ok(actual) = std::fs::read(&full_path) else { return false };
    actual == diff.expected_new_file_content().into_bytes()
}

/// Run `am --quiet` (optionally `--3way`), falling back to a non-3-way
/// attempt if 3-way hits "could not build fake ancestor" or "sha1
/// information is lacking".
fn run_am(patch_path: &Path, opts: &ApplyOptions, apply_check_err: Option<String>) -> anyhow::Result<Finding> {
    let out = run_am_once(patch_path, opts, opts.use_3way)?;
    if out.success() {
        return Ok(Finding::Applied);
    }

    if opts.use_3way && is_fake_ancestor_failure(&out.stderr) {
        abort_am(opts.target_dir)?;
        let fallback = run_am_once(patch_path, opts, false)?;
        if fallback.success() {
            return Ok(Finding::Applied);
        }
        return Ok(classify_failure(patch_path, &fallback, apply_check_err));
    }

    Ok(classify_failure(patch_path, &out, apply_check_err))
}

fn run_am_once(patch_path: &Path, opts: &ApplyOptions, use_3way: bool) -> anyhow::Result<RunOutput> {
    let mut cmd = Command::new("git");
    cmd.current_dir(opts.target_dir).arg("am").arg("--quiet");
    if use_3way {
        cmd.arg("--3way");
    }
    if let Some(prefix) = opts.directory_prefix {
        cmd.arg(format!("--directory={prefix}"));
    }
    cmd.arg(patch_path);
    shell_exec::run(&mut cmd, Some("am"))
}

fn is_fake_ancestor_failure(stderr: &str) -> bool {
    stderr.contains("could not build fake ancestor") || stderr.contains("sha1 information is lacking")
}

fn abort_am(target_dir: &Path) -> anyhow::Result<()> {
    let mut cmd = Command::new("git");
    cmd.current_dir(target_dir).args(["am", "--abort"]);
    shell_exec::run(&mut cmd, Some("am-abort"))?;
    Ok(())
}

/// Parse stderr into a [`PatchFailureKind`] and the files it names.
fn classify_failure(patch_path: &Path, out: &RunOutput, apply_check_err: Option<String>) -> Finding {
    let kind = classify_kind(&out.stderr);
    let paths = extract_paths(&out.stderr);
    let paths = if paths.is_empty() {
        vec![patch_path.display().to_string()]
    } else {
        paths
    };
    Finding::Failed { kind, paths, apply_check_err, err: Some(out.stderr.clone()) }
}

fn classify_kind(stderr: &str) -> PatchFailureKind {
    if stderr.contains("already exists in working directory") {
        PatchFailureKind::AlreadyExists
    } else if stderr.contains("does not exist in index") || stderr.contains("No such file or directory") {
        PatchFailureKind::MissingPath
    } else if stderr.contains("patch failed") || stderr.contains("patch does not apply") {
        PatchFailureKind::PatchFailed
    } else {
        PatchFailureKind::Unknown
    }
}

fn extract_paths(stderr: &str) -> Vec<String> {
    let re = Regex::new(r"error: (?:patch failed|.*?): ([^\s:]+)").expect("static regex");
    let mut paths: Vec<String> = re.captures_iter(stderr).map(|c| c[1].to_string()).collect();
    paths.sort();
    paths.dedup();
    paths
}

/// `am --show-current-patch`, used by preflight to report the first
/// conflicting patch without requiring the caller to track state itself.
pub fn show_current_patch(target_dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    let mut cmd = Command::new("git");
    cmd.current_dir(target_dir).args(["am", "--show-current-patch"]);
    let out = shell_exec::run(&mut cmd, Some("am-show-current-patch"))?;
    if !out.success() {
        return Ok(None);
    }
    Ok(Some(PathBuf::from(out.stdout.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_already_exists() {
        let kind = classify_kind("error: newfile.txt: already exists in working directory");
        assert_eq!(kind, PatchFailureKind::AlreadyExists);
    }

    #[test]
    fn classifies_missing_path() {
        let kind = classify_kind("error: a/gone.txt: does not exist in index");
        assert_eq!(kind, PatchFailureKind::MissingPath);
    }

    #[test]
    fn classifies_patch_failed() {
        let kind = classify_kind("error: patch failed: hello.txt:1");
        assert_eq!(kind, PatchFailureKind::PatchFailed);
    }

    #[test]
    fn classifies_unknown_for_unrecognized_stderr() {
        let kind = classify_kind("something unexpected happened");
        assert_eq!(kind, PatchFailureKind::Unknown);
    }

    #[test]
    fn detects_fake_ancestor_failure() {
        assert!(is_fake_ancestor_failure("fatal: repository lacks the necessary blobs to fall back on 3-way merge.\nCannot fall back to three-way merge.\nerror: could not build fake ancestor"));
        assert!(!is_fake_ancestor_failure("unrelated failure"));
    }

    #[test]
    fn file_is_identical_respects_no_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("newfile.txt"), "same").unwrap();

        let mut diff = patch::FileDiff {
            is_new_file: true,
            no_trailing_newline: true,
            plus_path: Some(PathBuf::from("newfile.txt")),
            ..Default::default()
        };
        diff.added_lines.push("same".to_string());

        assert!(file_is_identical(dir.path(), None, &diff));
    }

    #[test]
    fn file_is_identical_false_when_content_differs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("newfile.txt"), "different").unwrap();

        let mut diff =
            patch::FileDiff { is_new_file: true, plus_path: Some(PathBuf::from("newfile.txt")), ..Default::default() };
        diff.added_lines.push("same".to_string());

        assert!(!file_is_identical(dir.path(), None, &diff));
    }

    #[test]
    fn file_is_identical_honors_directory_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages/cli")).unwrap();
        std::fs::write(dir.path().join("newfile.txt"), "root-level, unrelated").unwrap();
        std::fs::write(dir.path().join("packages/cli/newfile.txt"), "same").unwrap();

        let mut diff =
            patch::FileDiff { is_new_file: true, plus_path: Some(PathBuf::from("newfile.txt")), ..Default::default() };
        diff.added_lines.push("same".to_string());

        // Without the prefix this would false-positive against the unrelated root-level file.
        assert!(!file_is_identical(dir.path(), None, &diff));
        assert!(file_is_identical(dir.path(), Some("packages/cli"), &diff));
    }
}
