//! Package-manager detection, dependency freshness, and the adapter
//! operations the Stack Supervisor and CLI commands consume.

mod freshness;

pub use freshness::needs_reinstall;

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::component::Component;
use crate::shell_exec::{self, RunOutput};
use crate::stack::StackIsolation;

/// Which package manager a component directory is managed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PackageManagerKind {
    Yarn,
    Pnpm,
}

impl PackageManagerKind {
    /// Detect the manager for `dir`: yarn if `yarn.lock` is present in `dir`
    /// or in the Happy monorepo root containing `dir`; pnpm otherwise.
    pub fn detect(dir: &Path) -> Self {
        if dir.join("yarn.lock").exists() {
            return Self::Yarn;
        }
        if let Some(monorepo_root) = find_monorepo_root(dir)
            && monorepo_root.join("yarn.lock").exists()
        {
            return Self::Yarn;
        }
        Self::Pnpm
    }

    fn binary(self) -> &'static str {
        match self {
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
        }
    }
}

fn find_monorepo_root(dir: &Path) -> Option<PathBuf> {
    let mut current = dir;
    loop {
        if crate::component::Component::is_monorepo_root(current) {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

/// Memoizes the one-time "yarn readiness" probe per `(dir, HOME, XDG_CACHE_HOME)`,
/// so repeated calls in one process don't re-run `yarn --version`.
static YARN_READY: Lazy<DashMap<(PathBuf, String, String), ()>> = Lazy::new(DashMap::new);

/// The operations the rest of the system consumes, applying the stack's
/// cache env on every call and ensuring yarn readiness when needed.
pub struct PackageManager<'a> {
    pub kind: PackageManagerKind,
    pub isolation: &'a StackIsolation,
}

impl<'a> PackageManager<'a> {
    pub fn for_component(component: &Component, isolation: &'a StackIsolation) -> Self {
        Self { kind: PackageManagerKind::detect(&component.operational_dir), isolation }
    }

    fn apply_env(&self, cmd: &mut Command) {
        for (k, v) in self.isolation.env_vars() {
            cmd.env(k, v);
        }
    }

    /// Unblock Corepack's interactive download prompt, memoized so it only
    /// runs once per `(dir, HOME, XDG_CACHE_HOME)` for the life of the process.
    fn ensure_yarn_ready(&self, dir: &Path) -> anyhow::Result<()> {
        if self.kind != PackageManagerKind::Yarn {
            return Ok(());
        }
        let home = self
            .isolation
            .home_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let xdg = self.isolation.xdg_cache_home.display().to_string();
        let key = (dir.to_path_buf(), home, xdg);

        if YARN_READY.contains_key(&key) {
            return Ok(());
        }

        let mut cmd = Command::new("yarn");
        cmd.arg("--version").current_dir(dir).stdin(Stdio::null());
        self.apply_env(&mut cmd);
        // Best-effort: a failure here shouldn't block install; the real
        // install call will surface a clearer error if yarn is genuinely broken.
        let _ = shell_exec::run(&mut cmd, Some("yarn-readiness"));

        YARN_READY.insert(key, ());
        Ok(())
    }

    /// Synchronous install, stdio inherited so progress is visible.
    pub fn install(&self, dir: &Path) -> anyhow::Result<RunOutput> {
        self.ensure_yarn_ready(dir)?;
        let mut cmd = Command::new(self.kind.binary());
        cmd.arg("install").current_dir(dir);
        self.apply_env(&mut cmd);
        shell_exec::run_checked(&mut cmd, Some("install"))
    }

    /// Run a locally-installed binary via the component's package manager.
    pub fn exec_bin(
        &self,
        dir: &Path,
        bin: &str,
        args: &[&str],
    ) -> anyhow::Result<RunOutput> {
        self.ensure_yarn_ready(dir)?;
        let mut cmd = match self.kind {
            PackageManagerKind::Yarn => {
                let mut c = Command::new("yarn");
                c.arg("exec").arg(bin);
                c
            }
            PackageManagerKind::Pnpm => {
                let mut c = Command::new("pnpm");
                c.arg("exec").arg(bin);
                c
            }
        };
        cmd.args(args).current_dir(dir);
        self.apply_env(&mut cmd);
        shell_exec::run_checked(&mut cmd, Some(bin))
    }

    /// Build a `Command` for a long-running binary, ready for the caller
    /// to `.spawn()` (process-group handling lives in [`crate::process`]).
    pub fn spawn_bin_command(&self, dir: &Path, bin: &str, args: &[&str]) -> Command {
        let mut cmd = match self.kind {
            PackageManagerKind::Yarn => {
                let mut c = Command::new("yarn");
                c.arg("exec").arg(bin);
                c
            }
            PackageManagerKind::Pnpm => {
                let mut c = Command::new("pnpm");
                c.arg("exec").arg(bin);
                c
            }
        };
        cmd.args(args).current_dir(dir);
        self.apply_env(&mut cmd);
        cmd
    }

    /// Build a `Command` that runs a `package.json` script.
    pub fn spawn_script_command(&self, dir: &Path, script: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(self.kind.binary());
        cmd.arg("run").arg(script).args(args).current_dir(dir);
        self.apply_env(&mut cmd);
        cmd
    }
}
