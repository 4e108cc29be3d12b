//! Structured error taxonomy.
//!
//! Library code returns [`HappyError`] at the seams that need structured
//! classification (apply protocol, ownership checks, preconditions). CLI
//! command handlers wrap these (and any other failure) in `anyhow::Result`
//! and format them at the command boundary — see [`crate::output`].

use std::path::PathBuf;

/// Abstract error kinds, one variant per structurally distinct failure.
///
/// Every variant carries enough context for the command boundary to print
/// a message naming the subsystem, the operation, and the next concrete
/// command to run.
#[derive(Debug, thiserror::Error)]
pub enum HappyError {
    #[error("{subsystem}: {message}")]
    UserInputInvalid { subsystem: &'static str, message: String },

    #[error("{subsystem}: precondition not met: {message}")]
    PreconditionUnmet { subsystem: &'static str, message: String },

    #[error("patch failed: {kind}{}", paths.iter().map(|p| format!(" {p}")).collect::<String>())]
    PatchFailed {
        kind: PatchFailureKind,
        paths: Vec<String>,
        apply_check_err: Option<String>,
        err: Option<String>,
    },

    #[error("patch already exists at {path}")]
    PatchAlreadyExists { path: String },

    #[error("patch references a missing path: {path}")]
    PatchMissingPath { path: String },

    #[error("`{command}` failed (exit {}): {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
    SubprocessFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout_ms}ms")]
    SubprocessTimeout {
        command: String,
        timeout_ms: u64,
        stdout: String,
        stderr: String,
    },

    #[error(
        "an `am` session is already in progress in {repo_root}; resolve it first ({hint})"
    )]
    StateConflict { repo_root: PathBuf, hint: String },

    #[error(
        "refusing to kill pid {pid}: process does not carry stack {stack}'s ownership markers"
    )]
    NotOwned { pid: i32, stack: String },

    #[error("expected build artifact not found at {artifact}; run: {command}")]
    MissingArtifact { artifact: PathBuf, command: String },
}

/// Classification of a failed patch apply, parsed from `git am` stderr
/// (or, where available, from structured porcelain state) per the
/// "structured diagnostics" redesign direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PatchFailureKind {
    AlreadyExists,
    PatchFailed,
    MissingPath,
    Unknown,
}

impl HappyError {
    pub fn user_input(subsystem: &'static str, message: impl Into<String>) -> Self {
        Self::UserInputInvalid { subsystem, message: message.into() }
    }

    pub fn precondition(subsystem: &'static str, message: impl Into<String>) -> Self {
        Self::PreconditionUnmet { subsystem, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_owned_names_pid_and_stack() {
        let err = HappyError::NotOwned { pid: 4242, stack: "dev".into() };
        let msg = err.to_string();
        assert!(msg.contains("4242"));
        assert!(msg.contains("dev"));
    }

    #[test]
    fn missing_artifact_names_command() {
        let err = HappyError::MissingArtifact {
            artifact: PathBuf::from("/tmp/cli/dist/index.js"),
            command: "yarn build".into(),
        };
        assert!(err.to_string().contains("yarn build"));
    }
}
