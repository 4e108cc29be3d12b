//! Incremental build: ties [`crate::build_signature`] to the package-manager
//! adapter for buildable components (the CLI), asserting the expected
//! artifact exists after a build actually ran.

use std::path::{Path, PathBuf};

use crate::build_signature::{self, BuildMode, BuildSignature};
use crate::error::HappyError;
use crate::package_manager::PackageManager;

/// What a component build needs to decide and verify freshness.
pub struct BuildSpec<'a> {
    pub label: &'a str,
    pub dir: &'a Path,
    pub artifact: &'a Path,
    pub script: &'a str,
    pub home: &'a Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Skipped,
    Built,
}

/// Run (or skip) the build for `spec` under `mode`.
pub fn ensure_built(spec: &BuildSpec, mode: BuildMode, pm: &PackageManager) -> anyhow::Result<BuildOutcome> {
    let current = BuildSignature::compute(spec.dir)?;
    let persisted = build_signature::load_persisted(spec.home, spec.label, spec.dir);
    let artifact_exists = spec.artifact.exists();

    if !build_signature::should_build(mode, &current, persisted.as_ref(), artifact_exists) {
        return Ok(BuildOutcome::Skipped);
    }

    let command = pm.spawn_script_command(spec.dir, spec.script, &[]);
    run_build_command(command, spec)?;

    if !spec.artifact.exists() {
        return Err(HappyError::MissingArtifact {
            artifact: spec.artifact.to_path_buf(),
            command: build_command_string(pm, spec),
        }
        .into());
    }

    build_signature::persist(spec.home, spec.label, spec.dir, &current)?;
    Ok(BuildOutcome::Built)
}

fn run_build_command(mut cmd: std::process::Command, spec: &BuildSpec) -> anyhow::Result<()> {
    cmd.current_dir(spec.dir);
    crate::shell_exec::run_checked(&mut cmd, Some(spec.label))?;
    Ok(())
}

fn build_command_string(pm: &PackageManager, spec: &BuildSpec) -> String {
    format!("{} run {}", pm.kind, spec.script)
}

/// Resolve the persisted build-signature label path for `(label, dir)` rooted
/// at `home`; exposed for CLI `status` output.
pub fn signature_path(home: &Path, label: &str, dir: &Path) -> PathBuf {
    build_signature::persisted_path(home, label, dir)
}
