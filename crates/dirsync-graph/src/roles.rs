//! Directory role membership.

use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, instrument};

use crate::graph_client::GraphClient;
use crate::GraphResult;

/// Reads activated directory roles and returns role display names keyed by member id.
#[instrument(skip(client))]
pub async fn fetch_role_memberships(client: &GraphClient) -> GraphResult<HashMap<String, Vec<String>>> {
    let url = format!(
        "{}/directoryRoles?$select=id,displayName&$expand=members($select=id)",
        client.base_url()
    );

    let mut memberships: HashMap<String, Vec<String>> = HashMap::new();
    let mut role_count = 0usize;

    client
        .get_paginated(&url, |page: Vec<Value>| {
            for role in page {
                let Some(role_name) = role.get("displayName").and_then(|v| v.as_str()) else {
                    continue;
                };
                role_count += 1;
                let members = role
                    .get("members")
                    .and_then(|v| v.as_array())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for member in members {
                    if let Some(id) = member.get("id").and_then(|v| v.as_str()) {
                        memberships
                            .entry(id.to_string())
                            .or_default()
                            .push(role_name.to_string());
                    }
                }
            }
            Ok(())
        })
        .await?;

    info!(
        roles = role_count,
        members = memberships.len(),
        "Fetched directory role memberships"
    );

    Ok(memberships)
}
