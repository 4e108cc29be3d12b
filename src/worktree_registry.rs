//! Worktree registry: maps components to per-owner/per-branch worktree
//! directories under `<components>/.worktrees/<repoKey>/<owner>/<branch...>`.
//!
//! Generalizes single-repo worktree listing/resolution/removal to many
//! components, where sub-packages of the Happy monorepo share one
//! `.worktrees/happy/` tree.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::component::{Component, ComponentName};
use crate::shell_exec;

/// `<owner>/<branch...>`, identifying a worktree directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeSpec {
    pub owner: String,
    pub branch: String,
}

impl WorktreeSpec {
    /// Parse `<owner>/<branch...>`. The branch may itself contain slashes
    /// (e.g. `alice/feature/foo`); only the first segment is the owner.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let (owner, branch) = raw
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("worktree spec {raw:?} must be <owner>/<branch>"))?;
        if owner.is_empty() || branch.is_empty() {
            bail!("worktree spec {raw:?} must be <owner>/<branch>");
        }
        Ok(Self { owner: owner.to_string(), branch: branch.to_string() })
    }

    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.owner).join(&self.branch)
    }
}

impl std::fmt::Display for WorktreeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.branch)
    }
}

/// The directory name under `.worktrees/` a component's worktrees live in.
///
/// Collapses to `happy` for every component that lives inside the Happy
/// monorepo, so all sub-packages (app, cli, server) share one worktree set
/// instead of checking out the same monorepo three times.
pub fn repo_key(component: &Component) -> String {
    if Component::is_monorepo_root(&component.repo_dir) {
        "happy".to_string()
    } else {
        component.name.to_string()
    }
}

/// Registry of worktrees for a set of components, rooted at `components_dir`.
pub struct WorktreeRegistry {
    pub components_dir: PathBuf,
}

impl WorktreeRegistry {
    pub fn new(components_dir: impl Into<PathBuf>) -> Self {
        Self { components_dir: components_dir.into() }
    }

    fn worktrees_root(&self, repo_key: &str) -> PathBuf {
        self.components_dir.join(".worktrees").join(repo_key)
    }

    /// Concrete directory a spec resolves to, including resolving into the
    /// monorepo sub-package directory when `component` lives inside one.
    pub fn resolve_dir(&self, component: &Component, spec: &WorktreeSpec) -> PathBuf {
        let key = repo_key(component);
        let worktree_root = self.worktrees_root(&key).join(spec.relative_path());
        if Component::is_monorepo_root(&component.repo_dir) {
            Component::resolve(component.name, &worktree_root).operational_dir
        } else {
            worktree_root
        }
    }

    /// List the worktree specs that currently exist for `repo_key`.
    pub fn list(&self, repo_key: &str) -> anyhow::Result<Vec<WorktreeSpec>> {
        let root = self.worktrees_root(repo_key);
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut specs = Vec::new();
        for owner_entry in std::fs::read_dir(&root).with_context(|| format!("reading {}", root.display()))? {
            let owner_entry = owner_entry?;
            if !owner_entry.file_type()?.is_dir() {
                continue;
            }
            let owner = owner_entry.file_name().to_string_lossy().into_owned();
            collect_branches(&owner_entry.path(), &owner, "", &mut specs)?;
        }
        specs.sort_by(|a, b| (&a.owner, &a.branch).cmp(&(&b.owner, &b.branch)));
        Ok(specs)
    }

    /// Create a new worktree at `spec`'s resolved path, branching from `base`.
    ///
    /// Runs `git worktree add -b <branch> <path> <base>` against the
    /// component's repo directory (the monorepo root, if applicable — not
    /// the resolved sub-package directory, since `git worktree add` operates
    /// on the repo as a whole).
    pub fn create(
        &self,
        component: &Component,
        spec: &WorktreeSpec,
        base: &str,
    ) -> anyhow::Result<PathBuf> {
        let key = repo_key(component);
        let worktree_root = self.worktrees_root(&key).join(spec.relative_path());
        if let Some(parent) = worktree_root.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut cmd = std::process::Command::new("git");
        cmd.current_dir(&component.repo_dir)
            .arg("worktree")
            .arg("add")
            .arg("-b")
            .arg(&spec.branch)
            .arg(&worktree_root)
            .arg(base);
        shell_exec::run_checked(&mut cmd, Some(&spec.to_string()))?;

        Ok(self.resolve_dir(component, spec))
    }
}

fn collect_branches(
    dir: &Path,
    owner: &str,
    branch_prefix: &str,
    out: &mut Vec<WorktreeSpec>,
) -> anyhow::Result<()> {
    // A leaf directory is one that git actually checked a worktree into,
    // recognizable by the presence of a `.git` file/dir it wrote.
    if dir.join(".git").exists() {
        out.push(WorktreeSpec { owner: owner.to_string(), branch: branch_prefix.trim_start_matches('/').to_string() });
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            collect_branches(&entry.path(), owner, &format!("{branch_prefix}/{name}"), out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_and_nested_branch() {
        let spec = WorktreeSpec::parse("alice/feature/foo").unwrap();
        assert_eq!(spec.owner, "alice");
        assert_eq!(spec.branch, "feature/foo");
        assert_eq!(spec.relative_path(), PathBuf::from("alice/feature/foo"));
    }

    #[test]
    fn rejects_spec_without_slash() {
        assert!(WorktreeSpec::parse("alice").is_err());
    }

    #[test]
    fn repo_key_collapses_to_happy_for_monorepo_components() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages/happy-cli")).unwrap();
        let component = Component::resolve(ComponentName::HappyCli, dir.path());
        assert_eq!(repo_key(&component), "happy");
    }

    #[test]
    fn repo_key_is_component_name_for_standalone_repo() {
        let dir = tempfile::tempdir().unwrap();
        let component = Component::resolve(ComponentName::HappyCli, dir.path());
        assert_eq!(repo_key(&component), "happy-cli");
    }

    #[test]
    fn list_returns_empty_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorktreeRegistry::new(dir.path());
        assert!(registry.list("happy").unwrap().is_empty());
    }
}
