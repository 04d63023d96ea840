//! CLI error types and exit codes

use dirsync_graph::GraphError;
use dirsync_reconcile::{GatewayError, ReconcileError};
use thiserror::Error;

use crate::config::ConfigError;

/// Exit codes for the CLI
/// - 0: Success (including a run stopped at the delete confirmation)
/// - 1: One or more applied operations failed
/// - 2: Configuration or input error
/// - 3: Authentication error
/// - 4: Directory error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Invalid desired state: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{failed} operation(s) failed")]
    OperationsFailed { failed: usize },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::OperationsFailed { .. } | CliError::Io(_) => 1,
            CliError::Config(_) | CliError::Input(_) | CliError::Validation(_) => 2,
            CliError::Auth(_) => 3,
            CliError::Directory(_) => 4,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    /// Get a suggested action for this error
    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => {
                Some("Check the DIRSYNC_* variables in your environment or .env file.")
            }
            CliError::Auth(_) => Some(
                "Verify DIRSYNC_TENANT_ID, DIRSYNC_CLIENT_ID and DIRSYNC_CLIENT_SECRET, and that the application has been granted User.ReadWrite.All.",
            ),
            CliError::Validation(_) => Some("Fix the CSV file; nothing was changed remotely."),
            CliError::OperationsFailed { .. } => Some(
                "Review the failures above. Re-running applies only what is still out of sync.",
            ),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ReconcileError> for CliError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Listing(GatewayError::Auth(msg)) => CliError::Auth(msg),
            ReconcileError::Listing(GatewayError::Configuration(msg)) => CliError::Config(msg),
            ReconcileError::Listing(inner) => CliError::Directory(inner.to_string()),
            other if other.is_configuration_error() => CliError::Validation(other.to_string()),
            other => CliError::Config(other.to_string()),
        }
    }
}

impl From<GraphError> for CliError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Config(msg) => CliError::Config(msg),
            GraphError::Url(e) => CliError::Config(format!("Invalid URL: {e}")),
            GraphError::Auth(msg) => CliError::Auth(msg),
            other => CliError::Directory(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<csv::Error> for CliError {
    fn from(e: csv::Error) -> Self {
        CliError::Input(format!("CSV error: {e}"))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("JSON error: {e}"))
    }
}
