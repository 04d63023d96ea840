//! Reconcile the directory against a CSV file

use clap::Args;
use dirsync_graph::GraphGateway;
use dirsync_reconcile::{DirectoryGateway, Reconciler, RunOptions, RunPhase, RunReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::SyncConfig;
use crate::error::{CliError, CliResult};
use crate::formats::csv::load_desired_state;
use crate::output::{print_success, print_warning, render_json, render_report};

/// Reconcile directory accounts with a CSV file
#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Path to the desired-state CSV file
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Show the plan without applying it
    #[arg(long)]
    pub dry_run: bool,

    /// Apply deletions without stopping for confirmation
    #[arg(long)]
    pub force: bool,

    /// Do not create missing accounts
    #[arg(long)]
    pub skip_create: bool,

    /// Do not update existing accounts
    #[arg(long)]
    pub skip_update: bool,

    /// Do not delete accounts missing from the file
    #[arg(long)]
    pub skip_delete: bool,

    /// List every field change in the plan
    #[arg(long)]
    pub show_diff: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    /// Run options for these flags and the configured batching.
    pub fn run_options(&self, config: &SyncConfig) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            force: self.force,
            skip_create: self.skip_create,
            skip_update: self.skip_update,
            skip_delete: self.skip_delete,
            batch_size: config.batch_size,
            batch_delay: config.batch_delay,
        }
    }
}

/// Execute the sync command
pub async fn execute(args: SyncArgs) -> CliResult<()> {
    let config = SyncConfig::from_env()?;
    let gateway = GraphGateway::new(config.credentials(), config.graph_config())?;

    let report = run_sync(&args, &config, Arc::new(gateway)).await?;
    print_report(&args, &report)?;

    match report.summary.as_ref() {
        Some(summary) if summary.has_failures() => Err(CliError::OperationsFailed {
            failed: summary.error_count(),
        }),
        _ => Ok(()),
    }
}

/// Loads the CSV and runs one reconciliation against `gateway`.
pub async fn run_sync(
    args: &SyncArgs,
    config: &SyncConfig,
    gateway: Arc<dyn DirectoryGateway>,
) -> CliResult<RunReport> {
    let desired = load_desired_state(&args.file)?;
    info!(
        file = %args.file.display(),
        accounts = desired.records.len(),
        custom_fields = desired.custom_fields.len(),
        "Desired state loaded"
    );

    let reconciler = Reconciler::new(gateway, config.protection_policy(), args.run_options(config));
    Ok(reconciler.run(&desired).await?)
}

fn print_report(args: &SyncArgs, report: &RunReport) -> CliResult<()> {
    if args.json {
        println!("{}", render_json(report)?);
        return Ok(());
    }

    print!("{}", render_report(report, args.show_diff));
    match report.phase {
        RunPhase::AwaitingConfirmation => print_warning("Deletions were not confirmed"),
        RunPhase::Done if report.exit_code() == 0 => print_success("Directory is in sync"),
        _ => {}
    }
    Ok(())
}
