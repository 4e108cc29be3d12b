//! External collaborator interfaces: thin seams the core consumes but does
//! not implement, using the plain `io::stdin().read_line()` /
//! terminal-detection prompt pattern for interactive commands.
//!
//! Concrete integrations (SwiftBar, LaunchAgent plists, Xcodeproj patching,
//! real terminal-launch/clipboard backends) are out of scope here; the
//! `Null*` implementations let the core run headless/non-interactively.

use std::io::IsTerminal;

/// One detected LLM CLI tool.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LlmTool {
    pub id: String,
    pub cmd: String,
    pub supports_auto_exec: bool,
}

/// Detects locally installed LLM CLI tools and runs prompts through them.
pub trait LlmToolProvider {
    fn detect(&self) -> Vec<LlmTool>;

    /// Render the conflict-resolution prompt via minijinja and execute it
    /// through `tool`, returning the tool's stdout.
    fn run_prompt(&self, tool: &LlmTool, prompt: &str) -> anyhow::Result<String>;
}

pub struct NullLlmProvider;

impl LlmToolProvider for NullLlmProvider {
    fn detect(&self) -> Vec<LlmTool> {
        Vec::new()
    }

    fn run_prompt(&self, tool: &LlmTool, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("no LLM tool available to run `{}`", tool.cmd)
    }
}

/// Outcome of attempting to launch a new terminal window.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LaunchOutcome {
    pub ok: bool,
    pub reason: Option<String>,
}

/// Launches a new terminal window running a given command (e.g. to hand a
/// conflict off to an interactive editor/LLM session).
pub trait TerminalLauncher {
    fn launch(&self, command: &str, cwd: &std::path::Path) -> LaunchOutcome;
}

pub struct NullTerminalLauncher;

impl TerminalLauncher for NullTerminalLauncher {
    fn launch(&self, _command: &str, _cwd: &std::path::Path) -> LaunchOutcome {
        LaunchOutcome { ok: false, reason: Some("terminal launching is not available in this environment".into()) }
    }
}

/// Copies text to the system clipboard, when one is available.
pub trait ClipboardProvider {
    fn available(&self) -> bool;
    fn copy(&self, text: &str) -> anyhow::Result<()>;
}

pub struct NullClipboardProvider;

impl ClipboardProvider for NullClipboardProvider {
    fn available(&self) -> bool {
        false
    }

    fn copy(&self, _text: &str) -> anyhow::Result<()> {
        anyhow::bail!("no clipboard available in this environment")
    }
}

/// A single choice offered by [`PromptUi::prompt_select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptChoice {
    pub key: String,
    pub label: String,
}

/// Interactive prompting. `HAPPY_STACKS_TEST_TTY` forces prompts to behave
/// as if a TTY is attached, for test harnesses that don't have one.
pub trait PromptUi {
    fn is_interactive(&self) -> bool;
    fn prompt(&self, message: &str) -> anyhow::Result<String>;
    fn prompt_select(&self, message: &str, choices: &[PromptChoice]) -> anyhow::Result<String>;
}

/// Reads from stdin line-by-line; `is_interactive` honors
/// `HAPPY_STACKS_TEST_TTY` for tests that fake a TTY.
pub struct StdioPromptUi;

impl PromptUi for StdioPromptUi {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() || std::env::var("HAPPY_STACKS_TEST_TTY").as_deref() == Ok("1")
    }

    fn prompt(&self, message: &str) -> anyhow::Result<String> {
        use std::io::Write;
        print!("{message}");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn prompt_select(&self, message: &str, choices: &[PromptChoice]) -> anyhow::Result<String> {
        for choice in choices {
            println!("  [{}] {}", choice.key, choice.label);
        }
        let picked = self.prompt(message)?;
        if choices.iter().any(|c| c.key == picked) {
            Ok(picked)
        } else {
            anyhow::bail!("unrecognized choice {picked:?}")
        }
    }
}

/// Non-interactive stub for `--json`/headless invocations: every prompt
/// fails loudly rather than hanging on stdin.
pub struct NonInteractiveUi;

impl PromptUi for NonInteractiveUi {
    fn is_interactive(&self) -> bool {
        false
    }

    fn prompt(&self, message: &str) -> anyhow::Result<String> {
        anyhow::bail!("cannot prompt non-interactively: {message}")
    }

    fn prompt_select(&self, message: &str, _choices: &[PromptChoice]) -> anyhow::Result<String> {
        anyhow::bail!("cannot prompt non-interactively: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_llm_provider_detects_nothing() {
        assert!(NullLlmProvider.detect().is_empty());
    }

    #[test]
    fn null_terminal_launcher_reports_unavailable() {
        let outcome = NullTerminalLauncher.launch("echo hi", std::path::Path::new("."));
        assert!(!outcome.ok);
    }

    #[test]
    fn non_interactive_ui_rejects_prompts() {
        assert!(NonInteractiveUi.prompt("continue? ").is_err());
    }
}
