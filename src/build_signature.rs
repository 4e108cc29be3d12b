//! Incremental build signatures: skip a build when the worktree hasn't
//! changed since the last successful build and the expected artifact
//! still exists.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::shell_exec;

/// `{head, statusHash, signature}`, where `signature = sha256(head + '\n' + porcelain-status)`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BuildSignature {
    pub head: String,
    pub status_hash: String,
    pub signature: String,
}

impl BuildSignature {
    /// Compute the current signature for the git worktree at `dir`.
    pub fn compute(dir: &Path) -> anyhow::Result<Self> {
        let mut head_cmd = Command::new("git");
        head_cmd.current_dir(dir).args(["rev-parse", "HEAD"]);
        let head_out = shell_exec::run_checked(&mut head_cmd, Some("build-signature"))?;
        let head = head_out.stdout.trim().to_string();

        let mut status_cmd = Command::new("git");
        status_cmd.current_dir(dir).args(["status", "--porcelain=v1"]);
        let status_out = shell_exec::run_checked(&mut status_cmd, Some("build-signature"))?;
        let status = status_out.stdout;

        let status_hash = hex_sha256(status.as_bytes());
        let signature = hex_sha256(format!("{head}\n{status}").as_bytes());

        Ok(Self { head, status_hash, signature })
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}



/// Persisted per `(label, resolved-dir)` at `<home>/cache/build/<label>/<sha256(dir)>.json`.
pub fn persisted_path(home: &Path, label: &str, dir: &Path) -> PathBuf {
    let dir_hash = hex_sha256(dir.to_string_lossy().as_bytes());
    home.join("cache").join("build").join(label).join(format!("{dir_hash}.json"))
}

/// Build mode: whether to force a build, skip unless forced, or decide
/// from the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Decide whether a build should run, given the mode, the freshly computed
/// signature, the persisted one (if any), and whether the artifact exists.
///
/// `never` still forces exactly one build when the artifact is absent —
/// "never rebuild unnecessarily" doesn't mean "never produce the artifact".
pub fn should_build(
    mode: BuildMode,
    current: &BuildSignature,
    persisted: Option<&BuildSignature>,
    artifact_exists: bool,
) -> bool {
    match mode {
        BuildMode::Always => true,
        BuildMode::Never => !artifact_exists,
        BuildMode::Auto => {
            !artifact_exists || persisted.map(|p| p.signature != current.signature).unwrap_or(true)
        }
    }
}

/// Load the persisted signature for `(label, dir)`, tolerating absence.
pub fn load_persisted(home: &Path, label: &str, dir: &Path) -> Option<BuildSignature> {
    let path = persisted_path(home, label, dir);
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Persist `signature` for `(label, dir)` via atomic write.
pub fn persist(home: &Path, label: &str, dir: &Path, signature: &BuildSignature) -> anyhow::Result<()> {
    let path = persisted_path(home, label, dir);
    let json = serde_json::to_string_pretty(signature)?;
    crate::env::write_atomic(&path, &json).with_context(|| format!("persisting build signature to {}", path.display()))
}
