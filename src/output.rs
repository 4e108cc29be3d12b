//! Command-boundary output.
//!
//! Two modes, selected once at startup by `--json`:
//! - `Interactive`: prose, colored via `color_print`, goes to stdout.
//! - `Json`: stdout carries exactly one structured JSON document per
//!   command; all prose (including errors) is redirected to stderr.
//!
//! Modes are named `Interactive`/`Json` to match this crate's `--json` flag.

use std::sync::OnceLock;

use color_print::cformat;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    Json,
}

static MODE: OnceLock<OutputMode> = OnceLock::new();

/// Set the output mode. Must be called once, early in `main`.
pub fn initialize(mode: OutputMode) {
    let _ = MODE.set(mode);
}

fn mode() -> OutputMode {
    *MODE.get().unwrap_or(&OutputMode::Interactive)
}

pub fn is_json() -> bool {
    mode() == OutputMode::Json
}

/// Emit the single structured result for a `--json` invocation.
///
/// No-op (prints nothing) in interactive mode — callers print their own
/// prose summary instead.
pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    if is_json() {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

fn emit(prefix: &str, message: &str) {
    match mode() {
        OutputMode::Interactive => println!("{prefix}{message}"),
        OutputMode::Json => eprintln!("{prefix}{message}"),
    }
}

pub fn info(message: impl AsRef<str>) {
    emit("", message.as_ref());
}

pub fn success(message: impl AsRef<str>) {
    emit(&cformat!("<green>✓</> "), message.as_ref());
}

pub fn warning(message: impl AsRef<str>) {
    emit(&cformat!("<yellow>⚠</> "), message.as_ref());
}

pub fn hint(message: impl AsRef<str>) {
    emit(&cformat!("<dim>hint:</> "), message.as_ref());
}

/// Format and emit a command-boundary failure: `[<subsystem>] failed: ...`.
///
/// Always goes to stderr, regardless of output mode, per the error
/// propagation policy.
pub fn command_failed(subsystem: &str, err: &anyhow::Error) {
    eprintln!("{}", cformat!("<red>[{}] failed:</> {}", subsystem, err));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mode_flag_round_trips() {
        initialize(OutputMode::Interactive);
        assert!(!is_json());
    }
}
