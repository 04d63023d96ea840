//! Graph endpoint and gateway configuration.

use std::fmt;
use std::str::FromStr;

use crate::batch::MAX_BATCH_REQUESTS;
use crate::throttle::RetryPolicy;
use crate::{GraphError, GraphResult};

/// National cloud the tenant lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GraphCloud {
    #[default]
    Global,
    UsGov,
    China,
}

impl GraphCloud {
    /// Microsoft Graph endpoint for this cloud.
    #[must_use]
    pub fn graph_endpoint(&self) -> &'static str {
        match self {
            Self::Global => "https://graph.microsoft.com",
            Self::UsGov => "https://graph.microsoft.us",
            Self::China => "https://microsoftgraph.chinacloudapi.cn",
        }
    }

    /// Identity platform endpoint for this cloud.
    #[must_use]
    pub fn login_endpoint(&self) -> &'static str {
        match self {
            Self::Global => "https://login.microsoftonline.com",
            Self::UsGov => "https://login.microsoftonline.us",
            Self::China => "https://login.chinacloudapi.cn",
        }
    }
}

impl FromStr for GraphCloud {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "commercial" | "public" => Ok(Self::Global),
            "usgov" | "us_gov" | "gcchigh" => Ok(Self::UsGov),
            "china" => Ok(Self::China),
            other => Err(GraphError::Config(format!("Unknown cloud '{other}'"))),
        }
    }
}

impl fmt::Display for GraphCloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Global => "global",
            Self::UsGov => "usgov",
            Self::China => "china",
        };
        f.write_str(name)
    }
}

/// Gateway settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Graph host, without API version.
    pub graph_url: String,
    pub api_version: String,
    /// Application whose directory extensions hold custom fields.
    pub extension_app_id: Option<String>,
    /// Requests per `$batch` call (1..=20).
    pub batch_limit: usize,
    /// Read directory role membership during listing.
    pub include_roles: bool,
    pub retry: RetryPolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::for_cloud(GraphCloud::Global)
    }
}

impl GraphConfig {
    /// Default settings for a national cloud.
    #[must_use]
    pub fn for_cloud(cloud: GraphCloud) -> Self {
        Self {
            graph_url: cloud.graph_endpoint().to_string(),
            api_version: "v1.0".to_string(),
            extension_app_id: None,
            batch_limit: MAX_BATCH_REQUESTS,
            include_roles: true,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_graph_url(mut self, url: impl Into<String>) -> Self {
        self.graph_url = url.into();
        self
    }

    #[must_use]
    pub fn with_extension_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.extension_app_id = Some(app_id.into());
        self
    }

    #[must_use]
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_roles(mut self, include_roles: bool) -> Self {
        self.include_roles = include_roles;
        self
    }

    /// Versioned base URL, e.g. `https://graph.microsoft.com/v1.0`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.graph_url.trim_end_matches('/'), self.api_version)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable Graph URL, a batch limit outside
    /// `1..=20` or an invalid retry policy.
    pub fn validate(&self) -> GraphResult<()> {
        url::Url::parse(&self.graph_url)?;
        if self.batch_limit == 0 || self.batch_limit > MAX_BATCH_REQUESTS {
            return Err(GraphError::Config(format!(
                "batch limit must be between 1 and {MAX_BATCH_REQUESTS}, got {}",
                self.batch_limit
            )));
        }
        self.retry
            .validate()
            .map_err(|e| GraphError::Config(format!("Invalid retry policy: {e}")))?;
        Ok(())
    }
}
