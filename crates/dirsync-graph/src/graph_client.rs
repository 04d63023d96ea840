//! Microsoft Graph HTTP client with pagination and retry handling.

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::auth::CredentialProvider;
use crate::config::GraphConfig;
use crate::throttle::RetryPolicy;
use crate::{GraphError, GraphResult};

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

/// `OData` error body.
#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
    #[serde(rename = "innerError")]
    pub inner_error: Option<serde_json::Value>,
}

/// Response wrapper for paginated Graph API responses.
#[derive(Debug, Deserialize)]
pub struct ODataResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Microsoft Graph API client.
#[derive(Debug)]
pub struct GraphClient {
    http_client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
    retry: RetryPolicy,
}

impl GraphClient {
    /// Creates a new Graph client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(credentials: Arc<dyn CredentialProvider>, config: &GraphConfig) -> GraphResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GraphError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            credentials,
            base_url: config.base_url(),
            retry: config.retry.clone(),
        })
    }

    /// Returns the versioned base URL for Graph API requests.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Performs a GET request and decodes the JSON body.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> GraphResult<T> {
        let response = self.send(Method::GET, url, None::<&()>).await?;
        decode(response).await
    }

    /// Performs a GET request, mapping 404 to `None`.
    #[instrument(skip(self))]
    pub async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> GraphResult<Option<T>> {
        match self.get(url).await {
            Ok(value) => Ok(Some(value)),
            Err(GraphError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Performs a POST request and decodes the JSON body.
    #[instrument(skip(self, body))]
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> GraphResult<T> {
        let response = self.send(Method::POST, url, Some(body)).await?;
        decode(response).await
    }

    /// Performs a PATCH request; Graph answers with no content.
    #[instrument(skip(self, body))]
    pub async fn patch<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> GraphResult<()> {
        self.send(Method::PATCH, url, Some(body)).await?;
        Ok(())
    }

    /// Performs a PUT request; Graph answers with no content.
    #[instrument(skip(self, body))]
    pub async fn put<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> GraphResult<()> {
        self.send(Method::PUT, url, Some(body)).await?;
        Ok(())
    }

    /// Performs a DELETE request.
    #[instrument(skip(self))]
    pub async fn delete(&self, url: &str) -> GraphResult<()> {
        self.send(Method::DELETE, url, None::<&()>).await?;
        Ok(())
    }

    /// Fetches all pages of a paginated response, processing each page via callback.
    #[instrument(skip(self, callback))]
    pub async fn get_paginated<T, F>(&self, initial_url: &str, mut callback: F) -> GraphResult<()>
    where
        T: DeserializeOwned,
        F: FnMut(Vec<T>) -> GraphResult<()>,
    {
        let mut url = initial_url.to_string();

        loop {
            debug!("Fetching page: {}", url);
            let response: ODataResponse<T> = self.get(&url).await?;

            callback(response.value)?;

            match response.next_link {
                Some(next) => url = next,
                None => return Ok(()),
            }
        }
    }

    /// Sends a request with token injection and retries.
    ///
    /// 429 and 502/503/504 are retried up to `max_retries` times. A 401 drops
    /// the cached token and is retried once.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> GraphResult<Response> {
        let mut attempts = 0u32;
        let mut reauthenticated = false;

        loop {
            let token = self.credentials.access_token().await?;

            let mut request = self
                .http_client
                .request(method.clone(), url)
                .bearer_auth(&token);
            if let Some(b) = body {
                request = request.json(b);
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                debug!("Access token rejected, acquiring a new one");
                self.credentials.invalidate().await;
                reauthenticated = true;
                continue;
            }

            let retryable = matches!(
                status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            );
            if retryable {
                if attempts >= self.retry.max_retries {
                    return Err(GraphError::MaxRetriesExceeded { attempts });
                }
                let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
                    response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(RetryPolicy::parse_retry_after)
                } else {
                    None
                };
                let delay = self.retry.delay_for(retry_after, attempts);
                attempts += 1;
                warn!(
                    "Transient error {}, retry {}/{} after {:?}",
                    status, attempts, self.retry.max_retries, delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(error_from_response(response).await);
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> GraphResult<T> {
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// Converts a failed response into a `GraphError`.
async fn error_from_response(response: Response) -> GraphError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_from_parts(status.as_u16(), &body)
}

/// Builds an error from a status and raw body, preferring the `OData` payload.
pub(crate) fn error_from_parts(status: u16, body: &str) -> GraphError {
    let (code, message) = match serde_json::from_str::<ODataError>(body) {
        Ok(odata) => (odata.error.code, odata.error.message),
        Err(_) => (status.to_string(), body.to_string()),
    };

    match status {
        401 | 403 => GraphError::Auth(format!("{code}: {message}")),
        404 => GraphError::NotFound(message),
        _ => GraphError::Api {
            status,
            code,
            message,
        },
    }
}
