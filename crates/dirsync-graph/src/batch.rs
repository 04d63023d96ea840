//! JSON batching over `POST /$batch`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

use crate::graph_client::{GraphClient, ODataError};
use crate::{GraphError, GraphResult};

/// Graph accepts at most this many requests per `$batch` call.
pub const MAX_BATCH_REQUESTS: usize = 20;

/// One request inside a `$batch` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRequestItem {
    pub id: String,
    pub method: String,
    /// URL relative to the versioned base, e.g. `/users/{id}`.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl BatchRequestItem {
    pub fn new(id: impl Into<String>, method: &str, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.to_string(),
            url: url.into(),
            body: None,
            headers: BTreeMap::new(),
        }
    }

    /// Attaches a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self.body = Some(body);
        self
    }
}

/// One response inside a `$batch` reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchResponseItem {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub body: Option<Value>,
}

impl BatchResponseItem {
    fn missing(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: 0,
            body: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error text for a failed item, taken from the `OData` body when present.
    #[must_use]
    pub fn error_message(&self) -> String {
        if self.status == 0 {
            return format!("No response returned for request {}", self.id);
        }
        let odata = self
            .body
            .clone()
            .and_then(|b| serde_json::from_value::<ODataError>(b).ok());
        match odata {
            Some(e) => format!("{} ({}): {}", e.error.code, self.status, e.error.message),
            None => format!("Request failed with status {}", self.status),
        }
    }

    /// `id` property of the response body, e.g. a created user's id.
    #[must_use]
    pub fn body_id(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.get("id"))
            .and_then(|v| v.as_str())
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: &'a [BatchRequestItem],
}

#[derive(Deserialize)]
struct BatchResponse {
    responses: Vec<BatchResponseItem>,
}

/// Sends requests as one `$batch` call.
///
/// Responses are returned in request order; a request the service did not
/// answer yields an item with status `0`.
///
/// # Errors
///
/// Returns `BatchTooLarge` for more than [`MAX_BATCH_REQUESTS`] requests, or
/// the transport error when the `$batch` call itself fails.
#[instrument(skip(client, requests), fields(size = requests.len()))]
pub async fn execute_batch(
    client: &GraphClient,
    requests: &[BatchRequestItem],
) -> GraphResult<Vec<BatchResponseItem>> {
    if requests.len() > MAX_BATCH_REQUESTS {
        return Err(GraphError::BatchTooLarge {
            size: requests.len(),
            limit: MAX_BATCH_REQUESTS,
        });
    }
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let url = format!("{}/$batch", client.base_url());
    let response: BatchResponse = client.post(&url, &BatchRequest { requests }).await?;
    debug!(responses = response.responses.len(), "Batch completed");

    let mut by_id: HashMap<String, BatchResponseItem> = response
        .responses
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();

    Ok(requests
        .iter()
        .map(|req| {
            by_id
                .remove(&req.id)
                .unwrap_or_else(|| BatchResponseItem::missing(&req.id))
        })
        .collect())
}
