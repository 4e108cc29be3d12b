//! Ownership-checked teardown: before a kill, inspect a candidate process's
//! full argv+env via `ps eww -p <pid>` and require a stack identifier plus
//! at least one of {env-file path, recognized home-dir binding}.

use std::process::Command;

use crate::error::HappyError;
use crate::process::registry::PidRegistry;
use crate::shell_exec;
use crate::stack::Stack;

/// What we found in a process's `ps eww` line, used to decide ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipProof {
    pub has_stack_identifier: bool,
    pub has_env_file_binding: bool,
    pub has_home_dir_binding: bool,
}

impl OwnershipProof {
    pub fn is_satisfied(&self) -> bool {
        self.has_stack_identifier && (self.has_env_file_binding || self.has_home_dir_binding)
    }
}

/// Read `ps eww -p <pid>` and check it for `stack`'s identity markers.
///
/// Returns `Ok(None)` if the pid no longer exists (already exited — not an
/// ownership failure, just nothing to tear down).
pub fn inspect(pid: i32, stack: &Stack) -> anyhow::Result<Option<OwnershipProof>> {
    let mut cmd = Command::new("ps");
    cmd.args(["eww", "-p", &pid.to_string()]);
    let out = shell_exec::run(&mut cmd, Some("ownership-check"))?;
    if !out.success() || out.stdout.lines().count() <= 1 {
        return Ok(None);
    }

    let line = out.stdout.lines().nth(1).unwrap_or_default();
    let stack_marker = format!("HAPPY_STACKS_STACK={}", stack.name);
    let legacy_marker = format!("HAPPY_LOCAL_STACK={}", stack.name);
    let env_file_marker = stack.env_file.display().to_string();
    let home_dir_marker = stack.base_dir.join("home").display().to_string();

    Ok(Some(OwnershipProof {
        has_stack_identifier: line.contains(&stack_marker) || line.contains(&legacy_marker),
        has_env_file_binding: line.contains(&env_file_marker),
        has_home_dir_binding: line.contains(&home_dir_marker),
    }))
}

/// Cross-check `pid` against the stack's `pids.json` registry, the
/// explicit supervisor-is-sole-writer signal alongside the `ps eww` scan.
///
/// A registry that hasn't been written yet (no prior `start`) doesn't
/// block teardown — this is a second signal layered onto the `ps eww`
/// proof, not a replacement for it. Once the registry exists, it must
/// name the pid.
fn registry_confirms(pid: i32, stack: &Stack) -> anyhow::Result<bool> {
    let path = stack.pid_registry_path();
    if !path.exists() {
        return Ok(true);
    }
    Ok(PidRegistry::load(&path)?.contains_pid(pid))
}

/// Tear down a process owned by `stack`'s runtime state, failing closed:
/// refuse to signal anything the ownership proof doesn't cover.
///
/// `SIGTERM` first; escalate to `SIGKILL` if the process group is still
/// alive after `grace`.
#[cfg(unix)]
pub fn teardown(pid: i32, stack: &Stack, grace: std::time::Duration) -> anyhow::Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(proof) = inspect(pid, stack)? else {
        return Ok(());
    };
    if !proof.is_satisfied() || !registry_confirms(pid, stack)? {
        return Err(HappyError::NotOwned { pid, stack: stack.name.to_string() }.into());
    }

    let pgid = Pid::from_raw(-pid);
    let _ = signal::kill(pgid, Signal::SIGTERM);

    let deadline = std::time::Instant::now() + grace;
    while std::time::Instant::now() < deadline {
        if signal::kill(Pid::from_raw(pid), None).is_err() {
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    let _ = signal::kill(pgid, Signal::SIGKILL);
    Ok(())
}

#[cfg(not(unix))]
pub fn teardown(pid: i32, stack: &Stack, _grace: std::time::Duration) -> anyhow::Result<()> {
    let Some(proof) = inspect(pid, stack)? else {
        return Ok(());
    };
    if !proof.is_satisfied() || !registry_confirms(pid, stack)? {
        return Err(HappyError::NotOwned { pid, stack: stack.name.to_string() }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_requires_stack_identifier_and_one_binding() {
        assert!(!OwnershipProof::default().is_satisfied());
        let mut proof = OwnershipProof { has_stack_identifier: true, ..Default::default() };
        assert!(!proof.is_satisfied());
        proof.has_env_file_binding = true;
        assert!(proof.is_satisfied());
    }

    #[test]
    fn home_dir_binding_alone_is_also_sufficient() {
        let proof =
            OwnershipProof { has_stack_identifier: true, has_home_dir_binding: true, ..Default::default() };
        assert!(proof.is_satisfied());
    }

    #[test]
    fn registry_confirms_when_no_registry_written_yet() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Stack::new(
            crate::stack::StackName::parse("dev").unwrap(),
            dir.path().join("env"),
            dir.path(),
        );
        assert!(registry_confirms(4242, &stack).unwrap());
    }

    #[test]
    fn registry_rejects_pid_absent_once_written() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Stack::new(
            crate::stack::StackName::parse("dev").unwrap(),
            dir.path().join("env"),
            dir.path(),
        );
        PidRegistry::record(&stack.pid_registry_path(), "happy-cli", 111).unwrap();
        assert!(registry_confirms(111, &stack).unwrap());
        assert!(!registry_confirms(999, &stack).unwrap());
    }

    #[test]
    fn inspect_returns_none_for_nonexistent_pid() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Stack::new(
            crate::stack::StackName::parse("dev").unwrap(),
            dir.path().join("env"),
            dir.path(),
        );
        let proof = inspect(i32::MAX - 1, &stack).unwrap();
        assert!(proof.is_none());
    }
}
