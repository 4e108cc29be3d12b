//! Monorepo Port Engine: transplants commits from split source repositories
//! into a unified monorepo via `format-patch` + `am`, with preflight,
//! resumable plans, and an interactive conflict loop.

pub mod apply;
pub mod conflict;
pub mod patch;
pub mod plan;
pub mod preflight;
pub mod prompt;
pub mod source;

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};

use crate::component::Component;
use crate::error::HappyError;
use crate::shell_exec;

use apply::{ApplyOptions, Finding};
use plan::{ConflictMode, PortPlan, SourceSpec};

/// One requested source, as supplied on the command line or by a guide prompt.
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub label: String,
    pub location: String,
    pub base_ref: String,
    pub head_ref: String,
}

/// A fully-specified port request.
#[derive(Debug, Clone)]
pub struct PortRequest {
    pub target: PathBuf,
    pub branch: Option<String>,
    pub base: Option<String>,
    pub onto_current: bool,
    pub dry_run: bool,
    pub use_3way: bool,
    pub continue_on_failure: bool,
    pub sources: Vec<SourceRequest>,
}

/// Result of running (or preflighting) a port, aggregated per source.
#[derive(Debug, Clone, Default)]
pub struct PortResult {
    pub ok: bool,
    pub findings: Vec<(String, Vec<Finding>)>,
}

impl PortResult {
    pub fn applied_count(&self) -> usize {
        self.findings.iter().flat_map(|(_, fs)| fs).filter(|f| matches!(f, Finding::Applied)).count()
    }

    pub fn skipped_already_applied_count(&self) -> usize {
        self.findings
            .iter()
            .flat_map(|(_, fs)| fs)
            .filter(|f| matches!(f, Finding::SkippedAlreadyApplied))
            .count()
    }

    pub fn skipped_identical_count(&self) -> usize {
        self.findings
            .iter()
            .flat_map(|(_, fs)| fs)
            .filter(|f| matches!(f, Finding::SkippedAlreadyExistsIdentical))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.findings.iter().flat_map(|(_, fs)| fs).filter(|f| f.is_failure()).count()
    }
}

/// The base-ref fallback chain tried when neither `--base` nor a symref is available.
const BASE_FALLBACK_CHAIN: [&str; 4] = ["upstream/main", "origin/main", "main", "master"];

/// Verify the target matches the expected monorepo layout.
pub fn check_monorepo_layout(target: &Path) -> anyhow::Result<()> {
    if !Component::is_monorepo_root(target) {
        return Err(HappyError::precondition(
            "monorepo-port",
            format!(
                "{} does not look like a Happy monorepo (expected packages/happy-{{app,cli,server}} or the legacy expo-app|cli|server layout)",
                target.display()
            ),
        )
        .into());
    }
    Ok(())
}

fn is_worktree_clean(target: &Path) -> anyhow::Result<bool> {
    let mut cmd = Command::new("git");
    cmd.current_dir(target).args(["status", "--porcelain=v1"]);
    let out = shell_exec::run_checked(&mut cmd, Some("clean-check"))?;
    Ok(out.stdout.trim().is_empty())
}

fn git_dir(target: &Path) -> anyhow::Result<PathBuf> {
    let mut cmd = Command::new("git");
    cmd.current_dir(target).args(["rev-parse", "--absolute-git-dir"]);
    let out = shell_exec::run_checked(&mut cmd, Some("git-dir"))?;
    Ok(PathBuf::from(out.stdout.trim()))
}

fn resolve_base_ref(target: &Path, explicit: Option<&str>) -> anyhow::Result<String> {
    if let Some(base) = explicit {
        return Ok(base.to_string());
    }

    let mut symref_cmd = Command::new("git");
    symref_cmd.current_dir(target).args(["symbolic-ref", "-q", "refs/remotes/origin/HEAD"]);
    if let Ok(out) = shell_exec::run(&mut symref_cmd, Some("base-symref"))
        && out.success()
    {
        let full = out.stdout.trim();
        if let Some(short) = full.strip_prefix("refs/remotes/") {
            return Ok(short.to_string());
        }
    }

    for candidate in BASE_FALLBACK_CHAIN {
        let mut check = Command::new("git");
        check.current_dir(target).args(["rev-parse", "--verify", "-q", candidate]);
        if let Ok(out) = shell_exec::run(&mut check, Some("base-candidate"))
            && out.success()
        {
            return Ok(candidate.to_string());
        }
    }

    bail!("could not resolve a base branch; pass --base explicitly")
}

/// Produce `.patch` files for `base..head` in a fresh temp directory,
/// returning them in lexicographic (commit) order. Empty if `base == head`.
fn produce_patches(repo_dir: &Path, base_ref: &str, head_ref: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut merge_base_cmd = Command::new("git");
    merge_base_cmd.current_dir(repo_dir).args(["merge-base", base_ref, head_ref]);
    let base = shell_exec::run_checked(&mut merge_base_cmd, Some("merge-base"))?.stdout.trim().to_string();

    let mut head_cmd = Command::new("git");
    head_cmd.current_dir(repo_dir).args(["rev-parse", head_ref]);
    let head = shell_exec::run_checked(&mut head_cmd, Some("rev-parse-head"))?.stdout.trim().to_string();

    if base == head {
        return Ok(Vec::new());
    }

    let out_dir = tempfile::Builder::new().prefix("happy-stacks-port-").tempdir()?;
    let out_path = out_dir.keep();

    let mut format_patch_cmd = Command::new("git");
    format_patch_cmd
        .current_dir(repo_dir)
        .arg("format-patch")
        .arg(format!("{base}..{head}"))
        .arg("-o")
        .arg(&out_path);
    shell_exec::run_checked(&mut format_patch_cmd, Some("format-patch"))?;

    let mut patches: Vec<PathBuf> = std::fs::read_dir(&out_path)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("patch"))
        .collect();
    patches.sort();
    Ok(patches)
}

/// Whether `repo_dir` is itself a monorepo root — in which case its patches
/// already carry `packages/*/` prefixes and the target subdir must not be
/// applied on top (avoids double-prefixing).
fn source_is_monorepo(repo_dir: &Path) -> bool {
    Component::is_monorepo_root(repo_dir)
}

/// Run the apply loop for one source's patches against `target_dir`.
fn apply_source(
    target_dir: &Path,
    patches: &[PathBuf],
    directory_prefix: Option<&str>,
    use_3way: bool,
    continue_on_failure: bool,
) -> anyhow::Result<Vec<Finding>> {
    let mut findings = Vec::new();
    for patch_path in patches {
        let text = std::fs::read_to_string(patch_path)
            .with_context(|| format!("reading patch {}", patch_path.display()))?;
        let opts = ApplyOptions { target_dir, directory_prefix, use_3way };
        let finding = apply::apply_patch(patch_path, &text, &opts)?;
        let is_failure = finding.is_failure();
        findings.push(finding);
        if is_failure && !continue_on_failure {
            break;
        }
    }
    Ok(findings)
}

/// Run a full port: branch setup, patch production, and the per-source
/// apply loop, building (and on success, deleting) the resumable Plan.
pub fn run(req: &PortRequest) -> anyhow::Result<PortResult> {
    shell_exec::ensure_on_path("git", "monorepo-port")?;
    check_monorepo_layout(&req.target)?;

    if req.onto_current && (req.branch.is_some() || req.base.is_some()) {
        bail!("--onto-current cannot be combined with --branch or --base");
    }

    let git_dir = git_dir(&req.target)?;
    let scratch_parent = PortPlan::sources_scratch_dir(&git_dir);

    if preflight::am_in_progress(&req.target)? {
        return Err(HappyError::StateConflict {
            repo_root: req.target.clone(),
            hint: "an `am` session is already in progress; run `happy monorepo port continue` or `git am --abort`"
                .to_string(),
        }
        .into());
    }

    if !req.onto_current && !is_worktree_clean(&req.target)? {
        return Err(HappyError::precondition(
            "monorepo-port",
            "target worktree is not clean; commit or stash changes first",
        )
        .into());
    }

    let base = resolve_base_ref(&req.target, req.base.as_deref())?;

    if !req.onto_current {
        let branch = req.branch.as_deref().context("--branch is required unless --onto-current")?;
        let mut checkout_base = Command::new("git");
        checkout_base.current_dir(&req.target).args(["checkout", "-q", &base]);
        shell_exec::run_checked(&mut checkout_base, Some("checkout-base"))?;

        let mut create_branch = Command::new("git");
        create_branch.current_dir(&req.target).args(["checkout", "-q", "-b", branch]);
        shell_exec::run_checked(&mut create_branch, Some("create-branch"))?;
    }

    let mut findings = Vec::new();
    let mut overall_ok = true;

    for source in &req.sources {
        let repo_dir = source::resolve(&source.location, &source.label, &scratch_parent)?;
        let patches = produce_patches(&repo_dir, &source.base_ref, &source.head_ref)?;

        let directory_prefix = if source_is_monorepo(&repo_dir) {
            None
        } else {
            Some(format!("packages/{}", source.label))
        };

        if req.dry_run {
            findings.push((source.label.clone(), Vec::new()));
            continue;
        }

        let source_findings = apply_source(
            &req.target,
            &patches,
            directory_prefix.as_deref(),
            req.use_3way,
            req.continue_on_failure,
        )?;

        let source_failed = source_findings.iter().any(Finding::is_failure);
        if source_failed {
            overall_ok = false;
        }
        findings.push((source.label.clone(), source_findings));

        if source_failed && !req.continue_on_failure {
            break;
        }
    }

    if overall_ok {
        PortPlan::delete(&git_dir)?;
    } else {
        persist_plan(req, &base, &git_dir)?;
    }

    Ok(PortResult { ok: overall_ok, findings })
}

fn persist_plan(req: &PortRequest, base: &str, git_dir: &Path) -> anyhow::Result<()> {
    let sources = req
        .sources
        .iter()
        .map(|s| SourceSpec {
            label: s.label.clone(),
            location: s.location.clone(),
            base_ref: s.base_ref.clone(),
            head_ref: s.head_ref.clone(),
            target_subdir: None,
        })
        .collect();
    let initial_argv = vec!["port".to_string(), format!("--target={}", req.target.display())];
    let plan = PortPlan::new(
        req.target.clone(),
        base.to_string(),
        req.branch.clone(),
        req.use_3way,
        ConflictMode::Guided,
        sources,
        initial_argv,
    );
    plan.persist(git_dir)
}

/// Run preflight: apply protocol against a disposable detached worktree at
/// the resolved base, never mutating the real checkout.
pub fn run_preflight(req: &PortRequest, components_dir: &Path) -> anyhow::Result<preflight::PreflightOutcome> {
    shell_exec::ensure_on_path("git", "monorepo-port")?;
    check_monorepo_layout(&req.target)?;
    let base = resolve_base_ref(&req.target, req.base.as_deref())?;
    let git_dir = git_dir(&req.target)?;
    let scratch_parent = PortPlan::sources_scratch_dir(&git_dir);

    let worktree = preflight::create_detached_worktree(&req.target, components_dir, "preflight", &base)?;
    let outcome = (|| -> anyhow::Result<preflight::PreflightOutcome> {
        for source in &req.sources {
            let repo_dir = source::resolve(&source.location, &source.label, &scratch_parent)?;
            let patches = produce_patches(&repo_dir, &source.base_ref, &source.head_ref)?;
            let directory_prefix = if source_is_monorepo(&repo_dir) {
                None
            } else {
                Some(format!("packages/{}", source.label))
            };

            let findings = apply_source(&worktree, &patches, directory_prefix.as_deref(), req.use_3way, false)?;
            if findings.iter().any(Finding::is_failure)
                && let Some(conflict) = preflight::report_conflict(&worktree)?
            {
                return Ok(preflight::PreflightOutcome::Conflict(conflict));
            }
        }
        Ok(preflight::PreflightOutcome::Ok)
    })();

    preflight::dispose(&req.target, &worktree);
    outcome
}
