//! Top-level CLI surface, built with `clap` derive: a `Cli` root with
//! global flags and a `Commands` enum.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "happy", about = "Local developer orchestration for the Happy stack", version)]
pub struct Cli {
    /// Emit structured JSON on stdout instead of prose.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug-level subprocess tracing.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Monorepo Port Engine operations.
    Monorepo {
        #[command(subcommand)]
        action: MonorepoCommand,
    },
    /// Start a stack's long-running component processes.
    Start(StartArgs),
    /// Stop a stack's long-running component processes.
    Stop(StopArgs),
    /// Report the status of a stack's processes.
    Status,
    /// Create or update a worktree for a component.
    Worktree(WorktreeArgs),
}

#[derive(Debug, Subcommand)]
pub enum MonorepoCommand {
    /// Transplant commits from one or more source repos into a monorepo.
    Port(PortArgs),
}

#[derive(Debug, clap::Args)]
pub struct PortArgs {
    #[command(subcommand)]
    pub action: PortAction,
}

#[derive(Debug, Subcommand)]
pub enum PortAction {
    /// Run a port non-interactively.
    Run(PortRunArgs),
    /// Dry-run conflict detection in a disposable worktree.
    Preflight(PortRunArgs),
    /// Interactive guided port with conflict resolution.
    Guide(PortRunArgs),
    /// Report whether a Plan is pending for a target.
    Status {
        #[arg(long)]
        target: std::path::PathBuf,
    },
    /// Advance an in-progress `am` session.
    Continue {
        #[arg(long)]
        target: std::path::PathBuf,
        /// Stage resolved files (`git add -A`) before continuing.
        #[arg(long)]
        stage: bool,
    },
}

#[derive(Debug, clap::Args)]
pub struct PortRunArgs {
    /// Target monorepo root.
    #[arg(long)]
    pub target: std::path::PathBuf,

    /// New branch to create from the resolved base.
    #[arg(long, conflicts_with = "onto_current")]
    pub branch: Option<String>,

    /// Explicit base ref, overriding symref/fallback-chain resolution.
    #[arg(long, conflicts_with = "onto_current")]
    pub base: Option<String>,

    /// Apply onto the current branch as-is.
    #[arg(long)]
    pub onto_current: bool,

    /// Report what would happen without applying patches.
    #[arg(long)]
    pub dry_run: bool,

    /// Use `git am --3way`.
    #[arg(long)]
    pub three_way: bool,

    /// Compat shim; identical-new-file detection is always on regardless.
    #[arg(long)]
    pub skip_applied: bool,

    /// Keep applying remaining sources/patches after a failure.
    #[arg(long)]
    pub continue_on_failure: bool,

    /// `--from-happy=<path|url|pr>`
    #[arg(long = "from-happy")]
    pub from_happy: Option<String>,
    #[arg(long = "from-happy-base")]
    pub from_happy_base: Option<String>,
    #[arg(long = "from-happy-ref", default_value = "HEAD")]
    pub from_happy_ref: String,

    /// `--from-happy-cli=<path|url|pr>`
    #[arg(long = "from-happy-cli")]
    pub from_happy_cli: Option<String>,
    #[arg(long = "from-happy-cli-base")]
    pub from_happy_cli_base: Option<String>,
    #[arg(long = "from-happy-cli-ref", default_value = "HEAD")]
    pub from_happy_cli_ref: String,

    /// `--from-happy-server=<path|url|pr>`
    #[arg(long = "from-happy-server")]
    pub from_happy_server: Option<String>,
    #[arg(long = "from-happy-server-base")]
    pub from_happy_server_base: Option<String>,
    #[arg(long = "from-happy-server-ref", default_value = "HEAD")]
    pub from_happy_server_ref: String,
}

#[derive(Debug, clap::Args)]
pub struct StartArgs {
    /// Which components to start; defaults to all.
    #[arg(long = "component")]
    pub components: Vec<String>,

    /// Restart even if a PID-state file claims the process is already running.
    #[arg(long)]
    pub restart: bool,
}

#[derive(Debug, clap::Args)]
pub struct StopArgs {
    #[arg(long = "component")]
    pub components: Vec<String>,
}

#[derive(Debug, clap::Args)]
pub struct WorktreeArgs {
    /// `<owner>/<branch...>`
    pub spec: String,

    #[arg(long)]
    pub component: String,

    #[arg(long, default_value = "HEAD")]
    pub base: String,
}
