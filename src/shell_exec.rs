//! The single place every external subprocess call goes through: a timed,
//! logged `Command` runner with an optional timeout, used for every
//! git/package-manager/supervised subprocess call.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::HappyError;

/// Output of a subprocess call, independent of whether it timed out.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

fn command_string(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy().to_string();
    let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
    if args.is_empty() {
        program
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Run `cmd` to completion, logging the command line and duration.
///
/// `context` is typically a worktree/component label used to disambiguate
/// concurrent log lines; pass `None` for standalone invocations.
pub fn run(cmd: &mut Command, context: Option<&str>) -> anyhow::Result<RunOutput> {
    run_with_timeout(cmd, context, None)
}

/// As [`run`], but kill the child and return [`HappyError::SubprocessTimeout`]
/// if it hasn't exited within `timeout`.
pub fn run_with_timeout(
    cmd: &mut Command,
    context: Option<&str>,
    timeout: Option<Duration>,
) -> anyhow::Result<RunOutput> {
    let cmd_str = command_string(cmd);
    match context {
        Some(ctx) => log::debug!("$ {cmd_str} [{ctx}]"),
        None => log::debug!("$ {cmd_str}"),
    }

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let t0 = Instant::now();
    let mut child = cmd.spawn()?;

    let Some(timeout) = timeout else {
        let output = child.wait_with_output()?;
        let dur = t0.elapsed();
        log_trace(context, &cmd_str, dur, output.status.success());
        return Ok(RunOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    };

    loop {
        if let Some(status) = child.try_wait()? {
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(mut s) = child.stdout.take() {
                let _ = s.read_to_string(&mut stdout);
            }
            if let Some(mut s) = child.stderr.take() {
                let _ = s.read_to_string(&mut stderr);
            }
            log_trace(context, &cmd_str, t0.elapsed(), status.success());
            return Ok(RunOutput { status: status.code(), stdout, stderr });
        }
        if t0.elapsed() >= timeout {
            let _ = child.kill();
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(mut s) = child.stdout.take() {
                let _ = s.read_to_string(&mut stdout);
            }
            if let Some(mut s) = child.stderr.take() {
                let _ = s.read_to_string(&mut stderr);
            }
            let _ = child.wait();
            return Err(HappyError::SubprocessTimeout {
                command: cmd_str,
                timeout_ms: timeout.as_millis() as u64,
                stdout,
                stderr,
            }
            .into());
        }
        std::thread::sleep(Duration::from_millis(15));
    }
}

fn log_trace(context: Option<&str>, cmd_str: &str, dur: Duration, ok: bool) {
    let ms = dur.as_secs_f64() * 1000.0;
    match context {
        Some(ctx) => log::debug!("[trace] context={ctx} cmd=\"{cmd_str}\" dur={ms:.1}ms ok={ok}"),
        None => log::debug!("[trace] cmd=\"{cmd_str}\" dur={ms:.1}ms ok={ok}"),
    }
}

/// Confirm `binary` is on `PATH`, failing with a precondition error naming
/// `subsystem` rather than letting callers hit a raw `ENOENT` from `spawn`.
pub fn ensure_on_path(binary: &str, subsystem: &'static str) -> anyhow::Result<()> {
    which::which(binary)
        .map(|_| ())
        .map_err(|_| HappyError::precondition(subsystem, format!("`{binary}` not found on PATH")).into())
}

/// Run `cmd` and fail with [`HappyError::SubprocessFailed`] unless it exits 0.
pub fn run_checked(cmd: &mut Command, context: Option<&str>) -> anyhow::Result<RunOutput> {
    let cmd_str = command_string(cmd);
    let out = run(cmd, context)?;
    if !out.success() {
        return Err(HappyError::SubprocessFailed {
            command: cmd_str,
            code: out.status,
            stderr: out.stderr,
        }
        .into());
    }
    Ok(out)
}
