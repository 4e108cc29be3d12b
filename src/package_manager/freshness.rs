//! Dependency freshness: decide whether a component needs a reinstall.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use super::PackageManagerKind;

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok()?.modified().ok()
}

fn newer_than(candidate: &Path, marker: SystemTime) -> bool {
    mtime(candidate).map(|t| t > marker).unwrap_or(false)
}

/// Whether `dir`'s `node_modules` is stale and should be reinstalled.
///
/// For yarn: `node_modules/.yarn-integrity` older than `yarn.lock`,
/// `package.json`, or any `.patch` under `patches/`.
///
/// For pnpm: `node_modules/.modules.yaml` older than `pnpm-lock.yaml`.
///
/// If a yarn-managed component has a pnpm-created `.modules.yaml`, the
/// caller should wipe `node_modules` and reinstall with yarn — that
/// destructive step is the caller's responsibility; this function only
/// reports staleness (`wrong_manager_marker` signals that case).
pub fn needs_reinstall(dir: &Path, kind: PackageManagerKind) -> ReinstallDecision {
    let node_modules = dir.join("node_modules");
    if !node_modules.is_dir() {
        return ReinstallDecision::reinstall("node_modules missing");
    }

    match kind {
        PackageManagerKind::Yarn => {
            let pnpm_marker = node_modules.join(".modules.yaml");
            if pnpm_marker.exists() {
                return ReinstallDecision {
                    stale: true,
                    wipe_node_modules: true,
                    reason: "node_modules was last installed by pnpm".to_string(),
                };
            }

            let integrity = node_modules.join(".yarn-integrity");
            let Some(integrity_time) = mtime(&integrity) else {
                return ReinstallDecision::reinstall(".yarn-integrity missing");
            };

            if newer_than(&dir.join("yarn.lock"), integrity_time) {
                return ReinstallDecision::reinstall("yarn.lock changed");
            }
            if newer_than(&dir.join("package.json"), integrity_time) {
                return ReinstallDecision::reinstall("package.json changed");
            }
            if let Ok(entries) = fs::read_dir(dir.join("patches")) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("patch")
                        && newer_than(&path, integrity_time)
                    {
                        return ReinstallDecision::reinstall("a patch file changed");
                    }
                }
            }
            ReinstallDecision::fresh()
        }
        PackageManagerKind::Pnpm => {
            let marker = node_modules.join(".modules.yaml");
            let Some(marker_time) = mtime(&marker) else {
                return ReinstallDecision::reinstall(".modules.yaml missing");
            };
            if newer_than(&dir.join("pnpm-lock.yaml"), marker_time) {
                return ReinstallDecision::reinstall("pnpm-lock.yaml changed");
            }
            ReinstallDecision::fresh()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReinstallDecision {
    pub stale: bool,
    /// Set when `node_modules` was created by the wrong manager and must be
    /// wiped before reinstalling.
    pub wipe_node_modules: bool,
    pub reason: String,
}

impl ReinstallDecision {
    fn fresh() -> Self {
        Self { stale: false, wipe_node_modules: false, reason: "up to date".to_string() }
    }

    fn reinstall(reason: &str) -> Self {
        Self { stale: true, wipe_node_modules: false, reason: reason.to_string() }
    }
}
