//! Per-process PID state: written after spawn, read by liveness checks,
//! deleted on clean shutdown.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::env::write_atomic;

/// `{pid, port, startedAt, projectDir}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PidState {
    pub pid: i32,
    pub port: Option<u16>,
    pub started_at: DateTime<Utc>,
    pub project_dir: PathBuf,
}

impl PidState {
    pub fn new(pid: i32, port: Option<u16>, project_dir: PathBuf) -> Self {
        Self { pid, port, started_at: Utc::now(), project_dir }
    }

    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn persist(&self, path: &Path) -> anyhow::Result<()> {
        write_atomic(path, &serde_json::to_string_pretty(self)?)
    }

    pub fn remove(path: &Path) -> anyhow::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }

    /// Whether the process this state describes is still alive at the
    /// kernel level (not just "pid reused by something else" — callers
    /// combine this with the ownership proof before acting on it).
    #[cfg(unix)]
    pub fn is_alive(&self) -> bool {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(self.pid), None).is_ok()
    }

    #[cfg(not(unix))]
    pub fn is_alive(&self) -> bool {
        // Best-effort: no portable liveness check without extra deps.
        true
    }
}

/// Per-process state file path under the stack's base dir.
pub fn state_path(stack_base_dir: &Path, label: &str) -> PathBuf {
    stack_base_dir.join("state").join(format!("{label}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.json");
        let state = PidState::new(12345, Some(8080), PathBuf::from("/repo/cli"));
        state.persist(&path).unwrap();

        let loaded = PidState::load(&path).unwrap().unwrap();
        assert_eq!(loaded.pid, 12345);
        assert_eq!(loaded.port, Some(8080));
    }

    #[test]
    fn load_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(PidState::load(&path).unwrap().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.json");
        PidState::remove(&path).unwrap();
        PidState::remove(&path).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn is_alive_true_for_self() {
        let state = PidState::new(std::process::id() as i32, None, PathBuf::from("."));
        assert!(state.is_alive());
    }

    #[test]
    #[cfg(unix)]
    fn is_alive_false_for_unlikely_pid() {
        // PID 2 is reserved (kthreadd on Linux, not owned by us); use an
        // implausibly large pid instead to avoid flaking on systems where it's real.
        let state = PidState::new(i32::MAX - 1, None, PathBuf::from("."));
        assert!(!state.is_alive());
    }
}
