//! Error types for the Graph gateway.

use dirsync_reconcile::GatewayError;
use thiserror::Error;

/// Result type alias using `GraphError`.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur when talking to Microsoft Graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// `OAuth2` authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Microsoft Graph API error.
    #[error("Graph API error ({status}): {code} - {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Too many requests for one `$batch` call.
    #[error("Batch of {size} requests exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// Maximum retry attempts exceeded.
    #[error("Maximum retries ({attempts}) exceeded")]
    MaxRetriesExceeded { attempts: u32 },
}

impl From<GraphError> for GatewayError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Auth(msg) => GatewayError::Auth(msg),
            GraphError::Config(msg) => GatewayError::Configuration(msg),
            GraphError::Url(e) => GatewayError::Configuration(format!("Invalid URL: {e}")),
            GraphError::NotFound(msg) => GatewayError::NotFound(msg),
            GraphError::Http(e) => GatewayError::Transport(e.to_string()),
            GraphError::MaxRetriesExceeded { attempts } => {
                GatewayError::Transport(format!("Maximum retries ({attempts}) exceeded"))
            }
            other => GatewayError::Remote(other.to_string()),
        }
    }
}
