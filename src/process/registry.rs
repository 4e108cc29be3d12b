//! The per-stack PID registry (`pids.json`): the Supervisor is the sole
//! writer, inserting on spawn and removing on clean teardown. Ownership
//! checks cross-reference this against the `ps eww` scan in
//! [`super::ownership`] rather than trusting either signal alone.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::env::write_atomic;

/// `{label: pid}` for every component this stack believes it owns.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PidRegistry {
    pids: BTreeMap<String, i32>,
}

impl PidRegistry {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn persist(&self, path: &Path) -> anyhow::Result<()> {
        write_atomic(path, &serde_json::to_string_pretty(self)?)
    }

    /// Record that `label` is now running as `pid`, read-merge-write so a
    /// concurrent entry for a different label isn't clobbered.
    pub fn record(path: &Path, label: &str, pid: i32) -> anyhow::Result<()> {
        let mut registry = Self::load(path)?;
        registry.pids.insert(label.to_string(), pid);
        registry.persist(path)
    }

    /// Drop `label`'s entry, e.g. on clean teardown.
    pub fn forget(path: &Path, label: &str) -> anyhow::Result<()> {
        let mut registry = Self::load(path)?;
        if registry.pids.remove(label).is_some() {
            registry.persist(path)?;
        }
        Ok(())
    }

    pub fn contains_pid(&self, pid: i32) -> bool {
        self.pids.values().any(|&p| p == pid)
    }
}

/// Per-stack registry file path.
pub fn registry_path(stack_base_dir: &Path) -> PathBuf {
    stack_base_dir.join("pids.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pids.json");
        PidRegistry::record(&path, "happy-cli", 4242).unwrap();

        let registry = PidRegistry::load(&path).unwrap();
        assert!(registry.contains_pid(4242));
        assert!(!registry.contains_pid(1));
    }

    #[test]
    fn record_preserves_other_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pids.json");
        PidRegistry::record(&path, "happy-cli", 111).unwrap();
        PidRegistry::record(&path, "happy-server", 222).unwrap();

        let registry = PidRegistry::load(&path).unwrap();
        assert!(registry.contains_pid(111));
        assert!(registry.contains_pid(222));
    }

    #[test]
    fn forget_removes_only_its_own_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pids.json");
        PidRegistry::record(&path, "happy-cli", 111).unwrap();
        PidRegistry::record(&path, "happy-server", 222).unwrap();

        PidRegistry::forget(&path, "happy-cli").unwrap();

        let registry = PidRegistry::load(&path).unwrap();
        assert!(!registry.contains_pid(111));
        assert!(registry.contains_pid(222));
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let registry = PidRegistry::load(&path).unwrap();
        assert!(!registry.contains_pid(1));
    }
}
