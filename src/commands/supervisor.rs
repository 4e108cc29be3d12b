//! CLI wiring for `start`/`stop`/`status`: drives the Stack Supervisor
//! (env layering, freshness, build, spawn, PID-state, ownership teardown).

use std::path::PathBuf;
use std::str::FromStr;

use crate::build::{self, BuildOutcome, BuildSpec};
use crate::build_signature::BuildMode;
use crate::cli::{StartArgs, StopArgs};
use crate::component::{Component, ComponentName};
use crate::output;
use crate::package_manager::{self, PackageManager};
use crate::process::{pid_state, ComponentSnapshot, PidRegistry, PidState, RuntimeState};
use crate::stack::Stack;

const ALL_COMPONENTS: [ComponentName; 2] = [ComponentName::HappyCli, ComponentName::HappyServer];

fn requested_components(names: &[String]) -> anyhow::Result<Vec<ComponentName>> {
    if names.is_empty() {
        return Ok(ALL_COMPONENTS.to_vec());
    }
    names
        .iter()
        .map(|n| ComponentName::from_str(n).map_err(|_| anyhow::anyhow!("unknown component {n:?}")))
        .collect()
}

pub fn handle_start(args: StartArgs) -> anyhow::Result<()> {
    let stack = Stack::from_env()?;
    let isolation = stack.isolation()?;
    let components = requested_components(&args.components)?;

    let mut started = Vec::new();
    for name in components {
        let component = Component::resolve(name, repo_dir_for(&stack, name)?);
        let label = name.to_string();
        let state_path = pid_state::state_path(&stack.base_dir, &label);

        if !args.restart
            && let Some(existing) = PidState::load(&state_path)?
            && existing.is_alive()
        {
            output::info(format!("{label}: already running (pid {})", existing.pid));
            continue;
        }

        let pm = PackageManager::for_component(&component, &isolation);
        let decision = package_manager::needs_reinstall(&component.operational_dir, pm.kind);
        if decision.stale {
            if decision.wipe_node_modules {
                let _ = std::fs::remove_dir_all(component.operational_dir.join("node_modules"));
            }
            pm.install(&component.operational_dir)?;
        }

        if name == ComponentName::HappyCli {
            let mode = std::env::var("HAPPY_STACKS_CLI_BUILD_MODE")
                .ok()
                .and_then(|v| BuildMode::from_str(&v).ok())
                .unwrap_or_default();
            let artifact = component.operational_dir.join("dist/index.js");
            let spec = BuildSpec {
                label: &label,
                dir: &component.operational_dir,
                artifact: &artifact,
                script: "build",
                home: &stack.base_dir,
            };
            match build::ensure_built(&spec, mode, &pm)? {
                BuildOutcome::Built => output::info(format!("{label}: build ran")),
                BuildOutcome::Skipped => output::info(format!("{label}: build skipped (up to date)")),
            }
        }

        let port = crate::port_alloc::find_free_port(crate::port_alloc::stable_start_port(stack.name.as_str()))?;
        let cmd = pm.spawn_script_command(&component.operational_dir, "start", &[]);
        let log_path = stack.base_dir.join("logs").join(format!("{label}.log"));
        let supervised = crate::process::Supervised::spawn(cmd, &label, &log_path, true)?;
        let pid = supervised.child.id() as i32;

        let pid_state = PidState::new(pid, Some(port), component.operational_dir.clone());
        pid_state.persist(&state_path)?;
        PidRegistry::record(&stack.pid_registry_path(), &label, pid)?;

        output::success(format!("{label}: started (pid {pid}, port {port})"));
        started.push(label);
    }

    output::json(&serde_json::json!({"started": started}))?;
    persist_runtime_state(&stack)?;
    Ok(())
}

pub fn handle_stop(args: StopArgs) -> anyhow::Result<()> {
    let stack = Stack::from_env()?;
    let components = requested_components(&args.components)?;

    let mut stopped = Vec::new();
    for name in components {
        let label = name.to_string();
        let state_path = pid_state::state_path(&stack.base_dir, &label);
        let Some(state) = PidState::load(&state_path)? else {
            output::info(format!("{label}: not running"));
            continue;
        };

        if !state.is_alive() {
            PidState::remove(&state_path)?;
            PidRegistry::forget(&stack.pid_registry_path(), &label)?;
            output::info(format!("{label}: already exited"));
            continue;
        }

        crate::process::teardown(state.pid, &stack, std::time::Duration::from_secs(5))?;
        PidState::remove(&state_path)?;
        PidRegistry::forget(&stack.pid_registry_path(), &label)?;
        output::success(format!("{label}: stopped"));
        stopped.push(label);
    }

    output::json(&serde_json::json!({"stopped": stopped}))?;
    persist_runtime_state(&stack)?;
    Ok(())
}

pub fn handle_status() -> anyhow::Result<()> {
    let stack = Stack::from_env()?;
    let mut statuses = Vec::new();
    for name in ALL_COMPONENTS {
        let label = name.to_string();
        let state_path = pid_state::state_path(&stack.base_dir, &label);
        let state = PidState::load(&state_path)?;
        let running = state.as_ref().map(|s| s.is_alive()).unwrap_or(false);
        statuses.push(serde_json::json!({"component": label, "running": running, "pid": state.map(|s| s.pid)}));
        output::info(format!("{label}: {}", if running { "running" } else { "stopped" }));
    }
    output::json(&serde_json::json!({"components": statuses}))?;
    persist_runtime_state(&stack)?;
    Ok(())
}

/// Rewrite the stack-wide `runtime-state.json` snapshot from each
/// component's current per-process PID-state.
fn persist_runtime_state(stack: &Stack) -> anyhow::Result<()> {
    let mut components = Vec::new();
    for name in ALL_COMPONENTS {
        let label = name.to_string();
        let state_path = pid_state::state_path(&stack.base_dir, &label);
        let state = PidState::load(&state_path)?;
        let running = state.as_ref().map(|s| s.is_alive()).unwrap_or(false);
        components.push(ComponentSnapshot {
            label,
            pid: state.as_ref().map(|s| s.pid),
            port: state.as_ref().and_then(|s| s.port),
            running,
        });
    }
    RuntimeState::new(components).persist(&stack.runtime_state_path())
}

fn repo_dir_for(stack: &Stack, name: ComponentName) -> anyhow::Result<PathBuf> {
    let label = name.to_string();
    if let Some(dir) = stack.component_overrides.get(&label) {
        return Ok(dir.clone());
    }
    std::env::current_dir().map_err(Into::into)
}
