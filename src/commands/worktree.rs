//! CLI wiring for `worktree`.

use crate::cli::WorktreeArgs;
use crate::component::{Component, ComponentName};
use crate::output;
use crate::worktree_registry::{WorktreeRegistry, WorktreeSpec};
use std::str::FromStr;

pub fn handle(args: WorktreeArgs) -> anyhow::Result<()> {
    let name = ComponentName::from_str(&args.component)
        .map_err(|_| anyhow::anyhow!("unknown component {:?}", args.component))?;
    let repo_dir = std::env::current_dir()?;
    let component = Component::resolve(name, &repo_dir);

    let spec = WorktreeSpec::parse(&args.spec)?;
    let components_dir = repo_dir.parent().unwrap_or(&repo_dir);
    let registry = WorktreeRegistry::new(components_dir);

    let dir = registry.create(&component, &spec, &args.base)?;

    output::json(&serde_json::json!({"path": dir}))?;
    if !output::is_json() {
        output::success(format!("worktree created at {}", dir.display()));
    }
    Ok(())
}
