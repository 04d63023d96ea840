//! Credential providers for Microsoft Graph.
//!
//! The gateway receives a [`CredentialProvider`] at construction; nothing else
//! in the process holds tokens.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::{GraphError, GraphResult};

/// Supplies bearer tokens for Graph requests.
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// Returns a valid access token.
    async fn access_token(&self) -> GraphResult<String>;

    /// Drops any cached token so the next call acquires a fresh one.
    async fn invalidate(&self) {}
}

/// A pre-acquired bearer token.
#[derive(Debug)]
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn access_token(&self) -> GraphResult<String> {
        Ok(self.token.expose_secret().to_string())
    }
}

/// Application credentials for the client-credentials flow.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Returns true if the token is expired or will expire within the grace period.
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Client-credentials flow with an in-memory token cache.
pub struct ClientCredentialsProvider {
    credentials: ClientCredentials,
    token_url: String,
    scope: String,
    http_client: reqwest::Client,
    cached_token: RwLock<Option<CachedToken>>,
    /// Refresh this long before expiry (default: 5 minutes).
    grace_period: Duration,
}

impl fmt::Debug for ClientCredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsProvider")
            .field("tenant_id", &self.credentials.tenant_id)
            .field("client_id", &self.credentials.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl ClientCredentialsProvider {
    /// Creates a provider for the given login and Graph endpoints.
    pub fn new(credentials: ClientCredentials, login_url: &str, graph_url: &str) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            login_url.trim_end_matches('/'),
            credentials.tenant_id
        );
        let scope = format!("{}/.default", graph_url.trim_end_matches('/'));

        Self {
            credentials,
            token_url,
            scope,
            http_client: reqwest::Client::new(),
            cached_token: RwLock::new(None),
            grace_period: Duration::minutes(5),
        }
    }

    #[instrument(skip(self), fields(tenant_id = %self.credentials.tenant_id))]
    async fn acquire_token(&self) -> GraphResult<CachedToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose_secret()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GraphError::Auth(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Auth(format!(
                "Token request failed with status {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GraphError::Auth(format!("Failed to parse token response: {e}")))?;

        let expires_at = Utc::now() + Duration::seconds(token.expires_in);
        debug!(
            "Acquired new token, expires at {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl CredentialProvider for ClientCredentialsProvider {
    async fn access_token(&self) -> GraphResult<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(token) = cache.as_ref() {
                if !token.is_expired(self.grace_period) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("Refreshing access token");
        let token = self.acquire_token().await?;
        let access_token = token.access_token.clone();
        *self.cached_token.write().await = Some(token);
        Ok(access_token)
    }

    async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_expiry() {
        let token = CachedToken {
            access_token: "test".to_string(),
            expires_at: Utc::now() + Duration::minutes(10),
        };
        assert!(!token.is_expired(Duration::minutes(5)));
        assert!(token.is_expired(Duration::minutes(15)));
    }

    #[test]
    fn test_token_url_and_scope() {
        let provider = ClientCredentialsProvider::new(
            ClientCredentials {
                tenant_id: "tenant-1".into(),
                client_id: "client".into(),
                client_secret: SecretString::from("secret".to_string()),
            },
            "https://login.microsoftonline.com/",
            "https://graph.microsoft.com",
        );
        assert_eq!(
            provider.token_url,
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(provider.scope, "https://graph.microsoft.com/.default");
    }

    #[test]
    fn test_debug_hides_secret() {
        let credentials = ClientCredentials {
            tenant_id: "t".into(),
            client_id: "c".into(),
            client_secret: SecretString::from("super-secret".to_string()),
        };
        let provider = ClientCredentialsProvider::new(credentials, "https://l", "https://g");
        assert!(!format!("{provider:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticTokenProvider::new(SecretString::from("abc".to_string()));
        assert_eq!(provider.access_token().await.unwrap(), "abc");
    }
}
