//! Layered environment resolution and the atomic env-file rewrite.
//!
//! Resolution order (highest wins): process env → stack env file → legacy
//! `HAPPY_LOCAL_*` fallback keys (mirrored onto `HAPPY_STACKS_*`) → built-in
//! defaults. The env file itself is a flat `KEY=value` dotenv-style file;
//! mutations always go through [`EnvFile::update`], which reads the current
//! file, merges in the new keys, and writes it back via write-temp-then-rename.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Maps a canonical `HAPPY_STACKS_*` key to its legacy `HAPPY_LOCAL_*` mirror.
fn legacy_key(key: &str) -> Option<String> {
    key.strip_prefix("HAPPY_STACKS_").map(|suffix| format!("HAPPY_LOCAL_{suffix}"))
}

/// Built-in defaults, lowest-priority layer.
fn builtin_defaults() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("HAPPY_STACKS_CLI_BUILD_MODE", "auto"),
        ("HAPPY_STACKS_PM_ISOLATE_HOME", "1"),
        ("HAPPY_STACKS_DISABLE_LLM_AUTOEXEC", "0"),
    ])
}

/// A parsed, on-disk stack env file plus the layered resolution logic.
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    pub path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl EnvFile {
    /// Load an env file, tolerating a missing file (empty layer).
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => parse_dotenv(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        Ok(Self { path, entries })
    }

    /// Resolve `key` following the full precedence chain.
    pub fn resolve(&self, key: &str) -> Option<String> {
        if let Ok(v) = std::env::var(key) {
            return Some(v);
        }
        if let Some(v) = self.entries.get(key) {
            return Some(v.clone());
        }
        if let Some(legacy) = legacy_key(key) {
            if let Ok(v) = std::env::var(&legacy) {
                return Some(v);
            }
            if let Some(v) = self.entries.get(&legacy) {
                return Some(v.clone());
            }
        }
        builtin_defaults().get(key).map(|v| v.to_string())
    }

    /// Resolve a boolean-ish flag, where only the literal `"0"` is false.
    pub fn resolve_flag(&self, key: &str, default: bool) -> bool {
        match self.resolve(key) {
            Some(v) => v != "0",
            None => default,
        }
    }

    /// Merge `updates` into the file and persist atomically (read-merge-write-temp-rename).
    ///
    /// Idempotent: applying the same updates twice yields identical file
    /// contents (keys are sorted, so key order never drifts between writes).
    pub fn update(&mut self, updates: &[(&str, &str)]) -> anyhow::Result<()> {
        // Re-read from disk first so concurrent-with-ourselves edits (e.g. a
        // prior `update` call in the same process) aren't clobbered.
        let mut current = match fs::read_to_string(&self.path) {
            Ok(contents) => parse_dotenv(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        for (k, v) in updates {
            current.insert((*k).to_string(), (*v).to_string());
        }

        write_atomic(&self.path, &render_dotenv(&current))?;
        self.entries = current;
        Ok(())
    }
}

fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let value = value.trim().trim_matches('"').to_string();
            map.insert(key, value);
        }
    }
    map
}

fn render_dotenv(entries: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (k, v) in entries {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }
    out
}

/// Write `contents` to `path` via a temp file in the same directory, then rename.
///
/// Same directory is required so the rename is guaranteed atomic (same
/// filesystem); a rename across filesystems would silently fall back to
/// copy+delete on some platforms.
pub fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_through_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env");
        fs::write(&path, "HAPPY_STACKS_HOME_DIR=/stack/home\n").unwrap();
        let env = EnvFile::load(&path).unwrap();

        assert_eq!(env.resolve("HAPPY_STACKS_HOME_DIR").as_deref(), Some("/stack/home"));
        // Falls through to built-in default.
        assert_eq!(env.resolve("HAPPY_STACKS_CLI_BUILD_MODE").as_deref(), Some("auto"));
        assert_eq!(env.resolve("HAPPY_STACKS_NO_SUCH_KEY"), None);
    }

    #[test]
    fn legacy_mirror_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env");
        fs::write(&path, "HAPPY_LOCAL_STACK=legacy-stack\n").unwrap();
        let env = EnvFile::load(&path).unwrap();
        assert_eq!(env.resolve("HAPPY_STACKS_STACK").as_deref(), Some("legacy-stack"));
    }

    #[test]
    fn update_is_idempotent_in_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env");
        let mut env = EnvFile::load(&path).unwrap();
        env.update(&[("A", "1"), ("B", "2")]).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        env.update(&[("A", "1"), ("B", "2")]).unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn resolve_flag_treats_only_zero_as_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env");
        fs::write(&path, "HAPPY_STACKS_PM_ISOLATE_HOME=0\n").unwrap();
        let env = EnvFile::load(&path).unwrap();
        assert!(!env.resolve_flag("HAPPY_STACKS_PM_ISOLATE_HOME", true));
    }
}
