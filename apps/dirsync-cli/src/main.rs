//! dirsync - reconcile directory user accounts with a CSV file
//!
//! Reads the desired accounts from CSV, compares them with Microsoft Graph
//! and creates, updates or deletes accounts until the directory matches.

use clap::{Parser, Subcommand};
use dirsync_cli::commands;
use dirsync_cli::error::CliResult;
use dirsync_cli::logging;

/// dirsync - CSV-driven directory account reconciliation
#[derive(Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile directory accounts with a CSV file
    Sync(commands::sync::SyncArgs),

    /// Export directory accounts to CSV
    Export(commands::export::ExportArgs),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Sync(args) => commands::sync::execute(args).await,
        Commands::Export(args) => commands::export::execute(args).await,
    }
}
