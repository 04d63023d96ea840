//! Error types for the reconciliation engine.

use thiserror::Error;

/// Result type alias using `ReconcileError`.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Result type alias for directory gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that abort a reconciliation run before any mutation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Two desired records share the same identity key.
    #[error("Duplicate email '{key}' in desired state (records {first} and {second})")]
    DuplicateKey {
        key: String,
        first: usize,
        second: usize,
    },

    /// A desired record has no identity key.
    #[error("Desired record {index} has no email")]
    MissingIdentity { index: usize },

    /// The remote directory could not be listed.
    #[error("Failed to read remote directory: {0}")]
    Listing(#[source] GatewayError),

    /// Run options are inconsistent.
    #[error("Invalid run options: {0}")]
    InvalidOptions(String),
}

impl ReconcileError {
    /// Returns true for data-integrity errors in the desired state.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateKey { .. }
                | Self::MissingIdentity { .. }
                | Self::InvalidOptions(_)
                | Self::Listing(GatewayError::Configuration(_))
        )
    }
}

/// Errors surfaced by a directory gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The request never produced a usable response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service rejected the request.
    #[error("Remote error: {0}")]
    Remote(String),

    /// The referenced account does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials could not be obtained or were refused.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The gateway is not configured for the request, e.g. custom fields
    /// without an extension application.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_listing_is_a_configuration_error() {
        let err = ReconcileError::Listing(GatewayError::Configuration("no app".into()));
        assert!(err.is_configuration_error());
        assert!(!ReconcileError::Listing(GatewayError::Transport("reset".into()))
            .is_configuration_error());
    }

    #[test]
    fn test_duplicate_key_message() {
        let err = ReconcileError::DuplicateKey {
            key: "a@x.com".into(),
            first: 1,
            second: 4,
        };
        assert_eq!(
            err.to_string(),
            "Duplicate email 'a@x.com' in desired state (records 1 and 4)"
        );
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_listing_is_not_configuration_error() {
        let err = ReconcileError::Listing(GatewayError::Transport("timeout".into()));
        assert!(!err.is_configuration_error());
        assert!(err.to_string().contains("timeout"));
    }
}
