use std::process::ExitCode;

use clap::Parser;

use happy_stacks::cli::{Cli, Commands, MonorepoCommand};
use happy_stacks::commands::{port, supervisor, worktree};
use happy_stacks::output::{self, OutputMode};

fn main() -> ExitCode {
    let cli = Cli::parse();

    output::initialize(if cli.json { OutputMode::Json } else { OutputMode::Interactive });

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "off" }),
    )
    .init();

    let (subsystem, result) = dispatch(cli.command);

    if let Err(err) = result {
        output::command_failed(subsystem, &err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn dispatch(command: Commands) -> (&'static str, anyhow::Result<()>) {
    match command {
        Commands::Monorepo { action: MonorepoCommand::Port(args) } => ("monorepo-port", port::handle(args)),
        Commands::Start(args) => ("supervisor", supervisor::handle_start(args)),
        Commands::Stop(args) => ("supervisor", supervisor::handle_stop(args)),
        Commands::Status => ("supervisor", supervisor::handle_status()),
        Commands::Worktree(args) => ("worktree", worktree::handle(args)),
    }
}
