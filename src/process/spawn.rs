//! Process-group spawn for supervised long-running component processes.
//!
//! `process_group(0)` puts the child in its own process group so it
//! survives the parent's PTY closing. Output is streamed and tracked
//! rather than fire-and-forgotten, since Stack Supervisor processes are
//! supervised background services, not one-shot hooks.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::Context;

/// A spawned, process-group-isolated child plus the thread handles streaming
/// its stdout/stderr line-by-line to the log file (and, if `tee`, to our own
/// stdout/stderr with a `[<label>]` prefix).
pub struct Supervised {
    pub child: Child,
    stdout_thread: Option<std::thread::JoinHandle<()>>,
    stderr_thread: Option<std::thread::JoinHandle<()>>,
}

impl Supervised {
    /// Spawn `cmd` detached into its own process group, with stdout/stderr
    /// piped through a line-prefixing tee into `log_path`.
    pub fn spawn(mut cmd: Command, label: &str, log_path: &Path, tee: bool) -> anyhow::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }

        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().context("failed to spawn supervised process")?;

        let log_file = File::create(log_path)
            .with_context(|| format!("creating log file {}", log_path.display()))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let label_owned = label.to_string();

        let stdout_thread = stdout.map(|out| {
            let log = log_file.try_clone().expect("clone log file handle");
            let label = label_owned.clone();
            std::thread::spawn(move || stream_lines(out, log, &label, tee, false))
        });
        let stderr_thread = stderr.map(|err| {
            let log = log_file.try_clone().expect("clone log file handle");
            let label = label_owned.clone();
            std::thread::spawn(move || stream_lines(err, log, &label, tee, true))
        });

        Ok(Self { child, stdout_thread, stderr_thread })
    }

    /// Wait for the child to exit, joining the streaming threads and writing
    /// a final `exited (code=…, sig=…)` line to the log.
    pub fn wait(mut self) -> anyhow::Result<std::process::ExitStatus> {
        let status = self.child.wait().context("waiting for supervised process")?;
        if let Some(t) = self.stdout_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.stderr_thread.take() {
            let _ = t.join();
        }
        Ok(status)
    }
}

fn stream_lines(
    mut reader: impl std::io::Read,
    mut log: File,
    label: &str,
    tee: bool,
    is_stderr: bool,
) {
    let mut buf = BufReader::new(&mut reader);
    let mut line = String::new();
    loop {
        line.clear();
        match buf.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let _ = log.write_all(line.as_bytes());
                if tee {
                    if is_stderr {
                        eprint!("[{label}] {line}");
                    } else {
                        print!("[{label}] {line}");
                    }
                }
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_streams_stdout_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("component.log");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo line-one; echo line-two");

        let supervised = Supervised::spawn(cmd, "cli", &log_path, false).unwrap();
        let status = supervised.wait().unwrap();
        assert!(status.success());

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("line-one"));
        assert!(contents.contains("line-two"));
    }

    #[test]
    fn spawn_captures_stderr_too() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("component.log");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo oops 1>&2");

        let supervised = Supervised::spawn(cmd, "server", &log_path, false).unwrap();
        supervised.wait().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("oops"));
    }
}
