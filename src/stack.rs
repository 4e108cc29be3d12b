//! The `Stack` data model: a named, per-developer runtime profile with an
//! isolated env file and derived cache/home directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::env::EnvFile;
use crate::project_config::ProjectConfig;

/// Expand `~`/env vars in a path-shaped env var's raw string value.
fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(raw).map(|c| c.into_owned()).unwrap_or_else(|_| raw.to_string()))
}

/// A DNS-safe stack name: lowercase alphanumerics and hyphens, 1-63 chars,
/// not starting or ending with a hyphen. A validated newtype rather than a
/// best-effort sanitizer, since a stack name is an identity (used for
/// ownership proof) rather than a filename.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct StackName(String);

impl StackName {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 63
            && raw.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !raw.starts_with('-')
            && !raw.ends_with('-');
        if !valid {
            bail!(
                "stack name {raw:?} is not DNS-safe: use lowercase letters, digits, and hyphens, \
                 1-63 characters, not starting or ending with a hyphen"
            );
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StackName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fallback env-file location when no `HAPPY_STACKS_ENV_FILE` is set:
/// `<platform data dir>/happy-stacks/<name>/env`.
fn default_env_file(name: &StackName) -> Option<PathBuf> {
    dirs::data_local_dir().map(|base| base.join("happy-stacks").join(name.as_str()).join("env"))
}

/// A named profile: env file path, base directory, per-component directory
/// overrides, and the runtime-state file path.
///
/// Invariant: `env_file` uniquely identifies the stack for ownership
/// checks, so two stacks must never share it (or their cache/home/tmp
/// directories, derived below).
#[derive(Debug, Clone)]
pub struct Stack {
    pub name: StackName,
    pub env_file: PathBuf,
    pub base_dir: PathBuf,
    pub component_overrides: BTreeMap<String, PathBuf>,
}

impl Stack {
    pub fn new(name: StackName, env_file: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            name,
            env_file: env_file.into(),
            base_dir: base_dir.into(),
            component_overrides: BTreeMap::new(),
        }
    }

    /// Resolve the active stack from the environment: `HAPPY_STACKS_STACK`
    /// (or legacy `HAPPY_LOCAL_STACK`), plus `HAPPY_STACKS_ENV_FILE` and
    /// `HAPPY_STACKS_HOME_DIR` (or their legacy mirrors).
    pub fn from_env() -> anyhow::Result<Self> {
        let name = std::env::var("HAPPY_STACKS_STACK")
            .or_else(|_| std::env::var("HAPPY_LOCAL_STACK"))
            .context("no active stack: set HAPPY_STACKS_STACK or run inside a stack shell")?;
        let name = StackName::parse(&name)?;

        let env_file = match std::env::var("HAPPY_STACKS_ENV_FILE").or_else(|_| std::env::var("HAPPY_LOCAL_ENV_FILE")) {
            Ok(path) => expand_path(&path),
            Err(_) => default_env_file(&name)
                .with_context(|| format!("HAPPY_STACKS_ENV_FILE not set for stack {name}, and no platform data directory is available"))?,
        };

        let home_dir = std::env::var("HAPPY_STACKS_HOME_DIR")
            .or_else(|_| std::env::var("HAPPY_LOCAL_HOME_DIR"))
            .map(|raw| expand_path(&raw))
            .unwrap_or_else(|_| env_file.parent().unwrap_or(Path::new(".")).to_path_buf());

        let mut stack = Self::new(name, env_file, home_dir);
        if let Ok(cwd) = std::env::current_dir()
            && let Some((config, config_dir)) = ProjectConfig::discover(&cwd)?
        {
            stack.component_overrides = config.component_overrides(&config_dir);
        }
        Ok(stack)
    }

    pub fn env(&self) -> anyhow::Result<EnvFile> {
        EnvFile::load(&self.env_file)
    }

    /// Directory overrides plus `COREPACK_ENABLE_AUTO_PIN=0` and, unless
    /// `HAPPY_STACKS_PM_ISOLATE_HOME=0`, `HOME`/`USERPROFILE` pointed at
    /// this stack's isolated home. Created (best-effort) before returning.
    pub fn isolation(&self) -> anyhow::Result<StackIsolation> {
        let env = self.env()?;
        let cache_root = self.base_dir.join("cache");
        let isolation = StackIsolation {
            xdg_cache_home: cache_root.join("xdg"),
            yarn_cache: cache_root.join("yarn"),
            npm_cache: cache_root.join("npm"),
            corepack_home: cache_root.join("corepack"),
            home_dir: if env.resolve_flag("HAPPY_STACKS_PM_ISOLATE_HOME", true) {
                Some(self.base_dir.join("home"))
            } else {
                None
            },
        };
        for dir in isolation.all_dirs() {
            let _ = std::fs::create_dir_all(dir);
        }
        Ok(isolation)
    }

    pub fn runtime_state_path(&self) -> PathBuf {
        self.base_dir.join("runtime-state.json")
    }

    pub fn pid_registry_path(&self) -> PathBuf {
        self.base_dir.join("pids.json")
    }
}

/// Derived, per-stack cache/home directories.
#[derive(Debug, Clone)]
pub struct StackIsolation {
    pub xdg_cache_home: PathBuf,
    pub yarn_cache: PathBuf,
    pub npm_cache: PathBuf,
    pub corepack_home: PathBuf,
    /// `None` when `HAPPY_STACKS_PM_ISOLATE_HOME=0`.
    pub home_dir: Option<PathBuf>,
}

impl StackIsolation {
    fn all_dirs(&self) -> Vec<&PathBuf> {
        let mut dirs = vec![&self.xdg_cache_home, &self.yarn_cache, &self.npm_cache, &self.corepack_home];
        if let Some(home) = &self.home_dir {
            dirs.push(home);
        }
        dirs
    }

    /// Environment variables to overlay on every subprocess spawned for this stack.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("XDG_CACHE_HOME".to_string(), self.xdg_cache_home.display().to_string()),
            ("YARN_CACHE_FOLDER".to_string(), self.yarn_cache.display().to_string()),
            ("NPM_CONFIG_CACHE".to_string(), self.npm_cache.display().to_string()),
            ("COREPACK_HOME".to_string(), self.corepack_home.display().to_string()),
            ("COREPACK_ENABLE_AUTO_PIN".to_string(), "0".to_string()),
        ];
        if let Some(home) = &self.home_dir {
            let home_str = home.display().to_string();
            vars.push(("HOME".to_string(), home_str.clone()));
            vars.push(("USERPROFILE".to_string(), home_str));
        }
        vars
    }
}
