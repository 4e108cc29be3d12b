//! Component model: a named logical unit mapping to a repository directory,
//! with monorepo-subdir resolution.

use std::path::{Path, PathBuf};

/// The well-known components of the Happy product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ComponentName {
    Happy,
    HappyCli,
    HappyServer,
}

impl ComponentName {
    /// Current monorepo subdir name for this component.
    fn modern_subdir(self) -> &'static str {
        match self {
            ComponentName::Happy => "packages/happy-app",
            ComponentName::HappyCli => "packages/happy-cli",
            ComponentName::HappyServer => "packages/happy-server",
        }
    }

    /// Legacy (pre-monorepo-rename) subdir name, still recognized.
    fn legacy_subdir(self) -> &'static str {
        match self {
            ComponentName::Happy => "expo-app",
            ComponentName::HappyCli => "cli",
            ComponentName::HappyServer => "server",
        }
    }
}

/// A component's resolved directory, along with whether the directory
/// itself is the repo root (standalone) or a subdir inside a monorepo.
#[derive(Debug, Clone)]
pub struct Component {
    pub name: ComponentName,
    /// The repository directory (may be a plain repo root or a monorepo root).
    pub repo_dir: PathBuf,
    /// The operational directory: `repo_dir` itself, or a known subdir.
    pub operational_dir: PathBuf,
}

impl Component {
    /// Resolve a component's operational directory given its repository root.
    ///
    /// If `repo_dir` contains the component's modern or legacy subdir, that
    /// subdir is the operational directory (monorepo layout); otherwise
    /// `repo_dir` itself is used (standalone repo).
    pub fn resolve(name: ComponentName, repo_dir: impl Into<PathBuf>) -> Self {
        let repo_dir = repo_dir.into();
        let modern = repo_dir.join(name.modern_subdir());
        let legacy = repo_dir.join(name.legacy_subdir());
        let operational_dir = if modern.is_dir() {
            modern
        } else if legacy.is_dir() {
            legacy
        } else {
            repo_dir.clone()
        };
        Self { name, repo_dir, operational_dir }
    }

    /// Whether `repo_dir` is itself a Happy monorepo root: contains at
    /// least one of the modern or legacy component subdirs.
    pub fn is_monorepo_root(repo_dir: &Path) -> bool {
        [ComponentName::Happy, ComponentName::HappyCli, ComponentName::HappyServer]
            .into_iter()
            .any(|c| repo_dir.join(c.modern_subdir()).is_dir() || repo_dir.join(c.legacy_subdir()).is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_modern_subdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages/happy-cli")).unwrap();
        let c = Component::resolve(ComponentName::HappyCli, dir.path());
        assert_eq!(c.operational_dir, dir.path().join("packages/happy-cli"));
    }

    #[test]
    fn resolves_legacy_subdir_when_modern_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cli")).unwrap();
        let c = Component::resolve(ComponentName::HappyCli, dir.path());
        assert_eq!(c.operational_dir, dir.path().join("cli"));
    }

    #[test]
    fn standalone_repo_uses_repo_dir() {
        let dir = tempfile::tempdir().unwrap();
        let c = Component::resolve(ComponentName::HappyCli, dir.path());
        assert_eq!(c.operational_dir, dir.path());
    }

    #[test]
    fn is_monorepo_root_detects_any_known_subdir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!Component::is_monorepo_root(dir.path()));
        std::fs::create_dir_all(dir.path().join("server")).unwrap();
        assert!(Component::is_monorepo_root(dir.path()));
    }
}
