//! The stack-wide runtime-state snapshot (`runtime-state.json`): a single
//! file summarizing every component's last-known pid/port, rewritten
//! whenever `start`/`stop`/`status` observes a change. Distinct from the
//! per-process `state/<label>.json` files (one writer per process) and
//! from [`super::registry::PidRegistry`] (the ownership cross-check).

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::env::write_atomic;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ComponentSnapshot {
    pub label: String,
    pub pid: Option<i32>,
    pub port: Option<u16>,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeState {
    pub updated_at: DateTime<Utc>,
    pub components: Vec<ComponentSnapshot>,
}

impl RuntimeState {
    pub fn new(components: Vec<ComponentSnapshot>) -> Self {
        Self { updated_at: Utc::now(), components }
    }

    pub fn persist(&self, path: &Path) -> anyhow::Result<()> {
        write_atomic(path, &serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime-state.json");
        let state = RuntimeState::new(vec![ComponentSnapshot {
            label: "happy-cli".into(),
            pid: Some(123),
            port: Some(8080),
            running: true,
        }]);
        state.persist(&path).unwrap();

        let loaded = RuntimeState::load(&path).unwrap().unwrap();
        assert_eq!(loaded.components.len(), 1);
        assert_eq!(loaded.components[0].pid, Some(123));
    }

    #[test]
    fn load_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(RuntimeState::load(&path).unwrap().is_none());
    }
}
