//! Tally — live occupancy counting CLI.
//!
//! # Usage
//!
//! ```text
//! tally daemon start|stop|status|logs
//! tally project init <name>
//! tally project list
//! tally add <project> <name> [--capacity N]
//! tally inc <project> <id> [--by N]
//! tally dec <project> <id> [--by N]
//! tally rename <project> <id> <name>
//! tally delete <project> <id>...
//! tally reset <project>
//! tally list [--project <name>] [--json]
//! tally stats <project>
//! tally watch <project>
//! ```

mod commands;
mod remote;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    add::AddArgs, count::CountArgs, daemon::DaemonCommand, delete::DeleteArgs, list::ListArgs,
    project::ProjectCommand, rename::RenameArgs, reset::ResetArgs, stats::StatsArgs,
    watch::WatchArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version,
    about = "Count seats and occupancy across live sections",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the Tally background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Manage projects (section namespaces).
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Add a section to a project.
    Add(AddArgs),

    /// Increment a section's occupancy count.
    Inc(CountArgs),

    /// Decrement a section's occupancy count.
    Dec(CountArgs),

    /// Rename a section.
    Rename(RenameArgs),

    /// Delete one or more sections.
    Delete(DeleteArgs),

    /// Reset every section count in a project to zero.
    Reset(ResetArgs),

    /// List sections across projects.
    List(ListArgs),

    /// Show a project's latest update and edit activity.
    Stats(StatsArgs),

    /// Follow a project's sections live, redrawing on every change.
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Project { command } => commands::project::run(command),
        Commands::Add(args) => args.run(),
        Commands::Inc(args) => args.run(commands::count::Direction::Up),
        Commands::Dec(args) => args.run(commands::count::Direction::Down),
        Commands::Rename(args) => args.run(),
        Commands::Delete(args) => args.run(),
        Commands::Reset(args) => args.run(),
        Commands::List(args) => args.run(),
        Commands::Stats(args) => args.run(),
        Commands::Watch(args) => args.run(),
    }
}

/// One current-thread runtime per command invocation; the session and its
/// subscription readers all run inside this `block_on`.
pub(crate) fn block_on<F, T>(future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(future)
}

pub(crate) fn home_dir() -> Result<std::path::PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}
