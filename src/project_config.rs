//! Per-repo project configuration (`happy.toml`): optional component
//! directory overrides, so a stack started from outside a component's
//! checkout can still find it. Discovered by walking up from the current
//! directory, the same "nearest ancestor" lookup used to locate a repo
//! root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

const FILE_NAME: &str = "happy.toml";

/// `[components]` table: `label = "path"`, `~` and `$VAR`-expanded and,
/// if relative, resolved against the directory the config file lives in.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    components: BTreeMap<String, String>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Walk up from `start` looking for `happy.toml`; `Ok(None)` if none is found.
    pub fn discover(start: &Path) -> anyhow::Result<Option<(Self, PathBuf)>> {
        let mut dir = Some(start);
        while let Some(d) = dir {
            let candidate = d.join(FILE_NAME);
            if candidate.is_file() {
                return Ok(Some((Self::load(&candidate)?, d.to_path_buf())));
            }
            dir = d.parent();
        }
        Ok(None)
    }

    /// Resolve every override to an absolute path, expanding `~`/env vars
    /// and joining relative paths onto `config_dir`.
    pub fn component_overrides(&self, config_dir: &Path) -> BTreeMap<String, PathBuf> {
        self.components
            .iter()
            .map(|(label, raw)| {
                let expanded = shellexpand::full(raw).map(|c| c.into_owned()).unwrap_or_else(|_| raw.clone());
                let path = PathBuf::from(expanded);
                let resolved = if path.is_absolute() { path } else { config_dir.join(path) };
                (label.clone(), resolved)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_finds_config_in_ancestor_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(FILE_NAME),
            "[components]\nhappy-cli = \"packages/cli\"\n",
        )
        .unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, found_in) = ProjectConfig::discover(&nested).unwrap().unwrap();
        assert_eq!(found_in, dir.path());
        let overrides = config.component_overrides(&found_in);
        assert_eq!(overrides.get("happy-cli"), Some(&dir.path().join("packages/cli")));
    }

    #[test]
    fn discover_returns_none_without_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectConfig::discover(dir.path()).unwrap().is_none());
    }

    #[test]
    fn relative_override_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::default();
        config.components.insert("happy-server".into(), "../happy-server".into());
        let overrides = config.component_overrides(dir.path());
        assert_eq!(overrides.get("happy-server"), Some(&dir.path().join("../happy-server")));
    }

    #[test]
    fn absolute_override_is_used_verbatim() {
        let mut config = ProjectConfig::default();
        config.components.insert("happy-cli".into(), "/opt/happy-cli".into());
        let overrides = config.component_overrides(Path::new("/wherever"));
        assert_eq!(overrides.get("happy-cli"), Some(&PathBuf::from("/opt/happy-cli")));
    }
}
