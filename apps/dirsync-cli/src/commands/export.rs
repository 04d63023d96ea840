//! Export directory accounts to CSV

use clap::Args;
use dirsync_graph::GraphGateway;
use std::path::PathBuf;

use crate::config::SyncConfig;
use crate::error::CliResult;
use crate::formats::csv::{export_accounts, write_accounts};
use crate::output::print_success;

/// Export directory accounts in the sync CSV layout
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Write to file instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Custom fields to include (comma-separated)
    #[arg(long = "custom-field", value_delimiter = ',')]
    pub custom_fields: Vec<String>,
}

/// Execute the export command
pub async fn execute(args: ExportArgs) -> CliResult<()> {
    let config = SyncConfig::from_env()?;
    let gateway = GraphGateway::new(config.credentials(), config.graph_config())?;

    let accounts = gateway.list_users(&args.custom_fields).await?;

    if let Some(ref output_path) = args.output {
        export_accounts(output_path, &accounts, &args.custom_fields)?;
        print_success(&format!(
            "Exported {} account(s) to {}",
            accounts.len(),
            output_path.display()
        ));
    } else {
        write_accounts(std::io::stdout().lock(), &accounts, &args.custom_fields)?;
    }

    Ok(())
}
