//! The persisted Port Plan: enables resuming a port across process restarts.
//! Written under the target repo's git-dir, atomically, and deleted only on
//! clean completion or explicit abort.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::env::write_atomic;

const PLAN_VERSION: u32 = 1;

/// One configured source within a port: where to get its commits and where
/// in the target they land.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceSpec {
    pub label: String,
    pub location: String,
    pub base_ref: String,
    pub head_ref: String,
    pub target_subdir: Option<String>,
}

/// `{version, createdAt, targetRepoRoot, base, branch, use3way,
/// preferredConflictMode, sources[], initialArgv[], resumeArgv[]}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PortPlan {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub target_repo_root: PathBuf,
    pub base: String,
    pub branch: Option<String>,
    pub use_3way: bool,
    pub preferred_conflict_mode: ConflictMode,
    pub sources: Vec<SourceSpec>,
    pub initial_argv: Vec<String>,
    pub resume_argv: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConflictMode {
    Guided,
    LlmAssisted,
}

impl PortPlan {
    pub fn new(
        target_repo_root: PathBuf,
        base: String,
        branch: Option<String>,
        use_3way: bool,
        preferred_conflict_mode: ConflictMode,
        sources: Vec<SourceSpec>,
        initial_argv: Vec<String>,
    ) -> Self {
        Self {
            version: PLAN_VERSION,
            created_at: Utc::now(),
            target_repo_root,
            base,
            branch,
            use_3way,
            preferred_conflict_mode,
            sources,
            initial_argv,
            resume_argv: vec!["--onto-current".to_string()],
        }
    }

    /// The fixed location a plan lives at under a target repo's git-dir.
    pub fn path(target_repo_git_dir: &Path) -> PathBuf {
        target_repo_git_dir.join("happy-stacks").join("monorepo-port-plan.json")
    }

    /// Directory scratch-cloned sources live under, for this target repo.
    pub fn sources_scratch_dir(target_repo_git_dir: &Path) -> PathBuf {
        target_repo_git_dir.join("happy-stacks").join("monorepo-port-sources")
    }

    pub fn load(target_repo_git_dir: &Path) -> anyhow::Result<Option<Self>> {
        let path = Self::path(target_repo_git_dir);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(
                serde_json::from_str(&contents)
                    .with_context(|| format!("parsing port plan at {}", path.display()))?,
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn persist(&self, target_repo_git_dir: &Path) -> anyhow::Result<()> {
        let path = Self::path(target_repo_git_dir);
        write_atomic(&path, &serde_json::to_string_pretty(self)?)
    }

    /// Delete the plan; idempotent, called only on clean completion or
    /// explicit abort — never on a mid-flight failure.
    pub fn delete(target_repo_git_dir: &Path) -> anyhow::Result<()> {
        let path = Self::path(target_repo_git_dir);
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> PortPlan {
        PortPlan::new(
            PathBuf::from("/repo"),
            "abc123".to_string(),
            Some("port/test".to_string()),
            false,
            ConflictMode::Guided,
            vec![SourceSpec {
                label: "happy-cli".to_string(),
                location: "/src/happy-cli".to_string(),
                base_ref: "main".to_string(),
                head_ref: "HEAD".to_string(),
                target_subdir: Some("packages/happy-cli".to_string()),
            }],
            vec!["port".to_string(), "--target=/repo".to_string()],
        )
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let plan = sample_plan();
        plan.persist(dir.path()).unwrap();

        let loaded = PortPlan::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn load_missing_plan_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PortPlan::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        PortPlan::delete(dir.path()).unwrap();
        sample_plan().persist(dir.path()).unwrap();
        PortPlan::delete(dir.path()).unwrap();
        PortPlan::delete(dir.path()).unwrap();
        assert!(PortPlan::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn resume_argv_defaults_to_onto_current() {
        assert_eq!(sample_plan().resume_argv, vec!["--onto-current".to_string()]);
    }

    #[test]
    fn path_is_rooted_under_happy_stacks_dir() {
        let path = PortPlan::path(Path::new("/repo/.git"));
        assert_eq!(path, PathBuf::from("/repo/.git/happy-stacks/monorepo-port-plan.json"));
    }
}
