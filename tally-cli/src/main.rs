//! Tally: reconcile a spreadsheet or folder tree against a remote datastore.
//!
//! # Usage
//!
//! ```text
//! tally init <job> --endpoint <url> --key <col>... (--sheet <id> --range <a1> | --folder <id>)
//!            [--batch-size N] [--page-size N] [--delay SECS]
//! tally jobs list
//! tally check <job>
//! tally diff <job>
//! tally run <job> [--dry-run] [--json]
//! tally run --all [--dry-run] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs, diff::DiffArgs, init::InitArgs, jobs::JobsCommand, run::RunArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version,
    about = "Upload the records a remote datastore is missing, exactly once",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a job file under ~/.tally/jobs/.
    Init(InitArgs),

    /// Inspect saved jobs.
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },

    /// Load and validate a job file, and report missing credentials.
    Check(CheckArgs),

    /// Show the records a run would upload, without writing anything.
    Diff(DiffArgs),

    /// Reconcile one job, or every job with --all.
    Run(RunArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Jobs { command } => commands::jobs::run(command),
        Commands::Check(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Run(args) => args.run(),
    }
}
