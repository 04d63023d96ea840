//! Environment configuration for sync and export runs.

use dirsync_graph::{
    ClientCredentials, ClientCredentialsProvider, CredentialProvider, GraphCloud, GraphConfig,
    StaticTokenProvider, MAX_BATCH_REQUESTS,
};
use dirsync_reconcile::{ProtectionPolicy, ProtectionRule};
use secrecy::SecretString;
use std::env::VarError;
use std::sync::Arc;
use std::time::Duration;

/// Roles protected from deletion when `DIRSYNC_PROTECTED_ROLES` is unset.
pub const DEFAULT_PROTECTED_ROLES: &[&str] =
    &["Global Administrator", "Privileged Role Administrator"];

/// How the CLI authenticates to Graph.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// OAuth2 client-credentials flow.
    ClientSecret {
        client_id: String,
        client_secret: SecretString,
    },
    /// A bearer token acquired elsewhere.
    AccessToken(SecretString),
}

/// Configuration for the dirsync CLI.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub tenant_id: String,
    pub auth: AuthMode,
    pub cloud: GraphCloud,
    /// Overrides the cloud's Graph endpoint.
    pub graph_url: Option<String>,
    /// Overrides the cloud's login endpoint.
    pub login_url: Option<String>,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub extension_app_id: Option<String>,
    pub protected_emails: Vec<String>,
    pub protected_domains: Vec<String>,
    pub protected_roles: Vec<String>,
    pub operator_email: Option<String>,
}

impl SyncConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let optional = |key: &str| {
            reader(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let tenant_id = optional("DIRSYNC_TENANT_ID")
            .ok_or_else(|| ConfigError::MissingVar("DIRSYNC_TENANT_ID".into()))?;

        let auth = match optional("DIRSYNC_ACCESS_TOKEN") {
            Some(token) => AuthMode::AccessToken(SecretString::from(token)),
            None => {
                let client_id = optional("DIRSYNC_CLIENT_ID")
                    .ok_or_else(|| ConfigError::MissingVar("DIRSYNC_CLIENT_ID".into()))?;
                let client_secret = optional("DIRSYNC_CLIENT_SECRET")
                    .ok_or_else(|| ConfigError::MissingVar("DIRSYNC_CLIENT_SECRET".into()))?;
                AuthMode::ClientSecret {
                    client_id,
                    client_secret: SecretString::from(client_secret),
                }
            }
        };

        let cloud = match optional("DIRSYNC_CLOUD") {
            Some(value) => value
                .parse::<GraphCloud>()
                .map_err(|e| ConfigError::InvalidValue("DIRSYNC_CLOUD".into(), e.to_string()))?,
            None => GraphCloud::Global,
        };

        let batch_size = optional("DIRSYNC_BATCH_SIZE")
            .unwrap_or_else(|| MAX_BATCH_REQUESTS.to_string())
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue("DIRSYNC_BATCH_SIZE".into(), e.to_string()))?;
        if batch_size == 0 || batch_size > MAX_BATCH_REQUESTS {
            return Err(ConfigError::InvalidValue(
                "DIRSYNC_BATCH_SIZE".into(),
                format!("must be between 1 and {MAX_BATCH_REQUESTS}"),
            ));
        }

        let batch_delay_ms = optional("DIRSYNC_BATCH_DELAY_MS")
            .unwrap_or_else(|| "500".to_string())
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidValue("DIRSYNC_BATCH_DELAY_MS".into(), e.to_string())
            })?;

        // An explicitly empty role list disables role protection.
        let protected_roles = match reader("DIRSYNC_PROTECTED_ROLES") {
            Ok(value) => split_list(&value),
            Err(_) => DEFAULT_PROTECTED_ROLES
                .iter()
                .map(|r| (*r).to_string())
                .collect(),
        };

        Ok(Self {
            tenant_id,
            auth,
            cloud,
            graph_url: optional("DIRSYNC_GRAPH_URL"),
            login_url: optional("DIRSYNC_LOGIN_URL"),
            batch_size,
            batch_delay: Duration::from_millis(batch_delay_ms),
            extension_app_id: optional("DIRSYNC_EXTENSION_APP_ID"),
            protected_emails: optional("DIRSYNC_PROTECTED_EMAILS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            protected_domains: optional("DIRSYNC_PROTECTED_DOMAINS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            protected_roles,
            operator_email: optional("DIRSYNC_OPERATOR_EMAIL"),
        })
    }

    /// Graph gateway settings.
    pub fn graph_config(&self) -> GraphConfig {
        let mut config = GraphConfig::for_cloud(self.cloud).with_batch_limit(self.batch_size);
        if let Some(url) = &self.graph_url {
            config = config.with_graph_url(url.clone());
        }
        if let Some(app_id) = &self.extension_app_id {
            config = config.with_extension_app_id(app_id.clone());
        }
        config
    }

    /// Credential provider for the configured authentication mode.
    pub fn credentials(&self) -> Arc<dyn CredentialProvider> {
        match &self.auth {
            AuthMode::AccessToken(token) => Arc::new(StaticTokenProvider::new(token.clone())),
            AuthMode::ClientSecret {
                client_id,
                client_secret,
            } => {
                let login_url = self
                    .login_url
                    .as_deref()
                    .unwrap_or(self.cloud.login_endpoint());
                let graph_url = self
                    .graph_url
                    .as_deref()
                    .unwrap_or(self.cloud.graph_endpoint());
                Arc::new(ClientCredentialsProvider::new(
                    ClientCredentials {
                        tenant_id: self.tenant_id.clone(),
                        client_id: client_id.clone(),
                        client_secret: client_secret.clone(),
                    },
                    login_url,
                    graph_url,
                ))
            }
        }
    }

    /// Deletion protection rules built from the protected lists.
    pub fn protection_policy(&self) -> ProtectionPolicy {
        let rules = self
            .protected_emails
            .iter()
            .cloned()
            .map(ProtectionRule::Email)
            .chain(self.protected_domains.iter().cloned().map(ProtectionRule::Domain))
            .chain(self.protected_roles.iter().cloned().map(ProtectionRule::Role))
            .chain(self.operator_email.iter().cloned().map(ProtectionRule::Operator))
            .collect();
        ProtectionPolicy::new(rules)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
