//! Source-spec recognition and resolution: local path vs URL vs GitHub PR.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};
use regex::Regex;

use crate::shell_exec;

/// How a source spec was recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    LocalPath(PathBuf),
    Url(String),
    GithubPr { owner: String, repo: String, number: u64 },
}

/// Classify a raw source spec string.
///
/// A spec is a URL if it contains a scheme (`://`), an scp-style git remote
/// (`git@host:`), or is a GitHub pull-request URL
/// (`github.com/<owner>/<repo>/pull/<n>`). Everything else is a local path.
pub fn classify(spec: &str) -> SourceLocation {
    if let Some(pr) = parse_github_pr(spec) {
        return pr;
    }
    if spec.contains("://") || is_scp_style(spec) {
        return SourceLocation::Url(spec.to_string());
    }
    SourceLocation::LocalPath(PathBuf::from(spec))
}

fn is_scp_style(spec: &str) -> bool {
    let re = Regex::new(r"^[A-Za-z0-9_.\-]+@[A-Za-z0-9_.\-]+:").expect("static regex");
    re.is_match(spec)
}

fn parse_github_pr(spec: &str) -> Option<SourceLocation> {
    let re = Regex::new(r"github\.com/([^/]+)/([^/]+)/pull/(\d+)").expect("static regex");
    let caps = re.captures(spec)?;
    Some(SourceLocation::GithubPr {
        owner: caps[1].to_string(),
        repo: caps[2].trim_end_matches(".git").to_string(),
        number: caps[3].parse().ok()?,
    })
}

/// A slug usable in a scratch-clone directory name, derived from the source.
pub fn slug(location: &SourceLocation) -> String {
    match location {
        SourceLocation::LocalPath(p) => {
            p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "source".to_string())
        }
        SourceLocation::Url(url) => url
            .rsplit('/')
            .next()
            .unwrap_or("source")
            .trim_end_matches(".git")
            .to_string(),
        SourceLocation::GithubPr { repo, number, .. } => format!("{repo}-pr{number}"),
    }
}

/// Resolve a source spec to a local repo directory, cloning into
/// `scratch_parent/<label>-<slug>/` when it isn't already a local path.
pub fn resolve(
    spec: &str,
    label: &str,
    scratch_parent: &Path,
) -> anyhow::Result<PathBuf> {
    let location = classify(spec);
    match &location {
        SourceLocation::LocalPath(path) => {
            if !path.is_dir() {
                bail!("source {label}: local path {} does not exist", path.display());
            }
            Ok(dunce::canonicalize(path).unwrap_or_else(|_| path.clone()))
        }
        SourceLocation::Url(url) => {
            let dest = scratch_parent.join(format!("{label}-{}", slug(&location)));
            if !dest.exists() {
                std::fs::create_dir_all(scratch_parent)?;
                let mut cmd = Command::new("git");
                cmd.args(["clone", "--no-single-branch", url]).arg(&dest);
                shell_exec::run_checked(&mut cmd, Some(label))
                    .with_context(|| format!("cloning source {label} from {url}"))?;
            }
            Ok(dest)
        }
        SourceLocation::GithubPr { owner, repo, number } => {
            let dest = scratch_parent.join(format!("{label}-{repo}-pr{number}"));
            let clone_url = format!("https://github.com/{owner}/{repo}.git");
            if !dest.exists() {
                std::fs::create_dir_all(scratch_parent)?;
                let mut clone_cmd = Command::new("git");
                clone_cmd.args(["clone", "--no-single-branch", &clone_url]).arg(&dest);
                shell_exec::run_checked(&mut clone_cmd, Some(label))
                    .with_context(|| format!("cloning source {label} from {clone_url}"))?;
            }
            let mut fetch_cmd = Command::new("git");
            fetch_cmd
                .current_dir(&dest)
                .args(["fetch", "origin", &format!("refs/pull/{number}/head:pr-{number}")]);
            shell_exec::run_checked(&mut fetch_cmd, Some(label))
                .with_context(|| format!("fetching refs/pull/{number}/head for source {label}"))?;
            Ok(dest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_local_path() {
        assert_eq!(classify("../happy-cli"), SourceLocation::LocalPath(PathBuf::from("../happy-cli")));
    }

    #[test]
    fn classifies_https_url() {
        assert_eq!(
            classify("https://github.com/acme/happy-cli.git"),
            SourceLocation::Url("https://github.com/acme/happy-cli.git".to_string())
        );
    }

    #[test]
    fn classifies_scp_style_url() {
        assert_eq!(
            classify("git@github.com:acme/happy-cli.git"),
            SourceLocation::Url("git@github.com:acme/happy-cli.git".to_string())
        );
    }

    #[test]
    fn classifies_github_pr_url() {
        let loc = classify("https://github.com/acme/happy-cli/pull/42");
        assert_eq!(
            loc,
            SourceLocation::GithubPr { owner: "acme".to_string(), repo: "happy-cli".to_string(), number: 42 }
        );
    }

    #[test]
    fn slug_strips_git_suffix() {
        let loc = SourceLocation::Url("https://github.com/acme/happy-cli.git".to_string());
        assert_eq!(slug(&loc), "happy-cli");
    }

    #[test]
    fn slug_for_pr_includes_number() {
        let loc = SourceLocation::GithubPr { owner: "acme".into(), repo: "happy-cli".into(), number: 42 };
        assert_eq!(slug(&loc), "happy-cli-pr42");
    }

    #[test]
    fn resolve_rejects_missing_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve("/does/not/exist", "happy-cli", dir.path()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
