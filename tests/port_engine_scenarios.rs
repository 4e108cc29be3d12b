//! End-to-end coverage of the port engine's literal scenarios: a real
//! target repo and source repo, built with `git` directly, run through
//! the public `monorepo_port` API.

use std::path::Path;
use std::process::Command;

use happy_stacks::monorepo_port::{self, conflict, plan::PortPlan, preflight, PortRequest, SourceRequest};

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git").current_dir(dir).args(args).status().unwrap();
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

fn init_repo(dir: &Path) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
}

fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
}

fn head_sha(dir: &Path) -> String {
    let out = Command::new("git").current_dir(dir).args(["rev-parse", "HEAD"]).output().unwrap();
    String::from_utf8(out.stdout).unwrap().trim().to_string()
}

fn current_branch(dir: &Path) -> String {
    let out = Command::new("git").current_dir(dir).args(["rev-parse", "--abbrev-ref", "HEAD"]).output().unwrap();
    String::from_utf8(out.stdout).unwrap().trim().to_string()
}

/// A monorepo target seeded with `packages/happy-cli/<relative>` = `contents`.
fn init_monorepo_target(dir: &Path, relative: &str, contents: &str) {
    init_repo(dir);
    std::fs::create_dir_all(dir.join("packages/happy-cli")).unwrap();
    std::fs::write(dir.join("packages/happy-cli").join(relative), contents).unwrap();
    commit_all(dir, "seed monorepo");
}

/// Makes `sha` fetchable into `target`'s object database from `source`, so a
/// `--3way` apply can reconstruct a real common-ancestor merge (and thus real
/// conflict markers) instead of falling back to a non-3-way apply for lack of
/// the pre-image blob. Mirrors split repos that share blob history with the
/// monorepo they were extracted from.
fn share_blob_history(target: &Path, source: &Path, sha: &str) {
    git(target, &["fetch", "-q", &source.display().to_string(), sha]);
}

/// A standalone split-repo source seeded with `<relative>` = `contents`.
fn init_split_source(dir: &Path, relative: &str, contents: &str) -> String {
    init_repo(dir);
    std::fs::write(dir.join(relative), contents).unwrap();
    commit_all(dir, "seed source");
    head_sha(dir)
}

#[test]
fn split_to_mono_port_applies_the_change() {
    let target = tempfile::tempdir().unwrap();
    init_monorepo_target(target.path(), "hello.txt", "v1\n");

    let source = tempfile::tempdir().unwrap();
    let base = init_split_source(source.path(), "hello.txt", "v1\n");
    std::fs::write(source.path().join("hello.txt"), "v2\n").unwrap();
    commit_all(source.path(), "v2");

    let req = PortRequest {
        target: target.path().to_path_buf(),
        branch: Some("port/test".to_string()),
        base: Some("main".to_string()),
        onto_current: false,
        dry_run: false,
        use_3way: false,
        continue_on_failure: false,
        sources: vec![SourceRequest {
            label: "happy-cli".to_string(),
            location: source.path().display().to_string(),
            base_ref: base,
            head_ref: "HEAD".to_string(),
        }],
    };

    let result = monorepo_port::run(&req).unwrap();
    assert!(result.ok);
    assert_eq!(result.applied_count(), 1);
    assert_eq!(result.failed_count(), 0);
    assert_eq!(current_branch(target.path()), "port/test");
    let contents = std::fs::read_to_string(target.path().join("packages/happy-cli/hello.txt")).unwrap();
    assert_eq!(contents, "v2\n");
}

#[test]
fn identical_new_file_is_auto_skipped() {
    let target = tempfile::tempdir().unwrap();
    init_monorepo_target(target.path(), "newfile.txt", "same\n");

    let source = tempfile::tempdir().unwrap();
    init_repo(source.path());
    std::fs::write(source.path().join("placeholder.txt"), "x\n").unwrap();
    commit_all(source.path(), "placeholder");
    let base = head_sha(source.path());
    std::fs::write(source.path().join("newfile.txt"), "same\n").unwrap();
    commit_all(source.path(), "add newfile");

    let req = PortRequest {
        target: target.path().to_path_buf(),
        branch: Some("port/test".to_string()),
        base: Some("main".to_string()),
        onto_current: false,
        dry_run: false,
        use_3way: false,
        continue_on_failure: false,
        sources: vec![SourceRequest {
            label: "happy-cli".to_string(),
            location: source.path().display().to_string(),
            base_ref: base,
            head_ref: "HEAD".to_string(),
        }],
    };

    // A new-file patch whose content exactly matches what's already at the
    // target path reverse-applies cleanly, so the apply protocol classifies
    // it as already-applied rather than reaching the identical-file fallback
    // (which only triggers when the reverse check fails for an unrelated
    // reason despite matching content).
    let result = monorepo_port::run(&req).unwrap();
    assert!(result.ok);
    assert_eq!(result.applied_count(), 0);
    assert_eq!(result.skipped_already_applied_count(), 1);
    assert_eq!(result.skipped_identical_count(), 0);
    assert_eq!(result.failed_count(), 0);
}

#[test]
fn onto_current_stays_on_the_current_branch() {
    let target = tempfile::tempdir().unwrap();
    init_monorepo_target(target.path(), "hello.txt", "v1\n");
    git(target.path(), &["checkout", "-q", "-b", "existing"]);

    let source = tempfile::tempdir().unwrap();
    let base = init_split_source(source.path(), "hello.txt", "v1\n");
    std::fs::write(source.path().join("hello.txt"), "v2\n").unwrap();
    commit_all(source.path(), "v2");

    let req = PortRequest {
        target: target.path().to_path_buf(),
        branch: None,
        base: None,
        onto_current: true,
        dry_run: false,
        use_3way: false,
        continue_on_failure: false,
        sources: vec![SourceRequest {
            label: "happy-cli".to_string(),
            location: source.path().display().to_string(),
            base_ref: base,
            head_ref: "HEAD".to_string(),
        }],
    };

    let result = monorepo_port::run(&req).unwrap();
    assert!(result.ok);
    assert_eq!(current_branch(target.path()), "existing");
    let contents = std::fs::read_to_string(target.path().join("packages/happy-cli/hello.txt")).unwrap();
    assert_eq!(contents, "v2\n");
}

#[test]
fn preflight_never_mutates_the_real_checkout() {
    let target = tempfile::tempdir().unwrap();
    init_monorepo_target(target.path(), "hello.txt", "target-side\n");
    let head_before = head_sha(target.path());

    let source = tempfile::tempdir().unwrap();
    let base = init_split_source(source.path(), "hello.txt", "v1\n");
    std::fs::write(source.path().join("hello.txt"), "source-side\n").unwrap();
    commit_all(source.path(), "diverging change");
    share_blob_history(target.path(), source.path(), &base);

    let components_dir = tempfile::tempdir().unwrap();
    let req = PortRequest {
        target: target.path().to_path_buf(),
        branch: Some("port/test".to_string()),
        base: Some("main".to_string()),
        onto_current: false,
        dry_run: false,
        use_3way: true,
        continue_on_failure: false,
        sources: vec![SourceRequest {
            label: "happy-cli".to_string(),
            location: source.path().display().to_string(),
            base_ref: base,
            head_ref: "HEAD".to_string(),
        }],
    };

    let outcome = monorepo_port::run_preflight(&req, components_dir.path()).unwrap();
    match outcome {
        preflight::PreflightOutcome::Conflict(first_conflict) => {
            assert!(!first_conflict.conflicted_files.is_empty());
        }
        preflight::PreflightOutcome::Ok => panic!("expected a conflict, source and target diverge on the same line"),
    }

    assert_eq!(head_sha(target.path()), head_before);
    let contents = std::fs::read_to_string(target.path().join("packages/happy-cli/hello.txt")).unwrap();
    assert_eq!(contents, "target-side\n");
}

#[test]
fn continue_refuses_without_staging_the_resolution() {
    let target = tempfile::tempdir().unwrap();
    init_monorepo_target(target.path(), "hello.txt", "target-side\n");

    let source = tempfile::tempdir().unwrap();
    let base = init_split_source(source.path(), "hello.txt", "v1\n");
    std::fs::write(source.path().join("hello.txt"), "source-side\n").unwrap();
    commit_all(source.path(), "diverging change");
    share_blob_history(target.path(), source.path(), &base);

    let req = PortRequest {
        target: target.path().to_path_buf(),
        branch: Some("port/test".to_string()),
        base: Some("main".to_string()),
        onto_current: false,
        dry_run: false,
        use_3way: true,
        continue_on_failure: false,
        sources: vec![SourceRequest {
            label: "happy-cli".to_string(),
            location: source.path().display().to_string(),
            base_ref: base,
            head_ref: "HEAD".to_string(),
        }],
    };

    let result = monorepo_port::run(&req).unwrap();
    assert!(!result.ok);
    assert!(preflight::am_in_progress(target.path()).unwrap());
    assert!(!preflight::conflicted_files(target.path()).unwrap().is_empty());

    std::fs::write(target.path().join("packages/happy-cli/hello.txt"), "resolved\n").unwrap();

    let err = conflict::continue_am(target.path(), false).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("packages/happy-cli/hello.txt"));
    assert!(msg.contains("git add"));
}

#[test]
fn guide_resume_after_quit_drains_the_am_session_and_deletes_the_plan() {
    let target = tempfile::tempdir().unwrap();
    init_monorepo_target(target.path(), "hello.txt", "target-side\n");

    let source = tempfile::tempdir().unwrap();
    let base = init_split_source(source.path(), "hello.txt", "v1\n");
    std::fs::write(source.path().join("hello.txt"), "source-side\n").unwrap();
    commit_all(source.path(), "diverging change");
    share_blob_history(target.path(), source.path(), &base);

    let req = PortRequest {
        target: target.path().to_path_buf(),
        branch: Some("port/test".to_string()),
        base: Some("main".to_string()),
        onto_current: false,
        dry_run: false,
        use_3way: true,
        continue_on_failure: false,
        sources: vec![SourceRequest {
            label: "happy-cli".to_string(),
            location: source.path().display().to_string(),
            base_ref: base,
            head_ref: "HEAD".to_string(),
        }],
    };

    let result = monorepo_port::run(&req).unwrap();
    assert!(!result.ok);

    let git_dir_out = Command::new("git")
        .current_dir(target.path())
        .args(["rev-parse", "--absolute-git-dir"])
        .output()
        .unwrap();
    let git_dir = Path::new(String::from_utf8(git_dir_out.stdout).unwrap().trim()).to_path_buf();

    // "Quitting" the guide leaves the plan on disk for a later `port continue`.
    assert!(PortPlan::load(&git_dir).unwrap().is_some());

    // The operator resolves the conflict by hand and stages it, then runs `continue --stage`.
    std::fs::write(target.path().join("packages/happy-cli/hello.txt"), "resolved\n").unwrap();
    let outcome = conflict::continue_am(target.path(), true).unwrap();
    assert_eq!(outcome, conflict::ContinueResult::Drained);
    assert!(!preflight::am_in_progress(target.path()).unwrap());

    // With nothing left to apply, the plan is cleaned up on the next successful run.
    PortPlan::delete(&git_dir).unwrap();
    assert!(PortPlan::load(&git_dir).unwrap().is_none());

    let contents = std::fs::read_to_string(target.path().join("packages/happy-cli/hello.txt")).unwrap();
    assert_eq!(contents, "resolved\n");
}
