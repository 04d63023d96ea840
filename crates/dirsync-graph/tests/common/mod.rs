//! Common test utilities for dirsync-graph integration tests.

#![allow(dead_code)]

use dirsync_graph::{GraphConfig, GraphGateway, RetryPolicy, StaticTokenProvider};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::MockServer;

pub const EXTENSION_APP_ID: &str = "aaaa-bbbb";

/// Test data factory for Graph users.
pub fn create_test_user(id: &str, email: &str) -> Value {
    json!({
        "id": id,
        "mail": email,
        "userPrincipalName": email,
        "displayName": format!("Test User {id}"),
        "accountEnabled": true,
        "jobTitle": "Test Engineer",
        "department": "Testing"
    })
}

/// Wraps items in an OData collection response.
pub fn create_odata_response(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut response = json!({ "value": items });
    if let Some(link) = next_link {
        response["@odata.nextLink"] = json!(link);
    }
    response
}

/// Creates an OData error body.
pub fn create_odata_error(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Creates a mock OAuth token response.
pub fn create_token_response(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
}

/// Creates a `$batch` reply.
pub fn create_batch_response(responses: Vec<Value>) -> Value {
    json!({ "responses": responses })
}

/// Gateway configuration pointing at the mock server.
pub fn test_config(server: &MockServer) -> GraphConfig {
    GraphConfig::default()
        .with_graph_url(server.uri())
        .with_retry(RetryPolicy::for_testing())
        .with_roles(false)
}

/// Gateway authenticated with a static token.
pub fn test_gateway(config: GraphConfig) -> GraphGateway {
    let credentials = Arc::new(StaticTokenProvider::new(SecretString::from(
        "test-token".to_string(),
    )));
    GraphGateway::new(credentials, config).unwrap()
}
