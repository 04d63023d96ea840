//! [`DirectoryGateway`] implementation over Microsoft Graph.

use async_trait::async_trait;
use dirsync_reconcile::{
    AccountRef, AccountUpdate, BatchOutcome, DesiredRecord, DirectoryGateway, GatewayResult,
    ObservedRecord,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::auth::CredentialProvider;
use crate::batch::{execute_batch, BatchRequestItem, BatchResponseItem};
use crate::config::GraphConfig;
use crate::graph_client::{GraphClient, ODataResponse};
use crate::roles::fetch_role_memberships;
use crate::schema::base_select;
use crate::users::{create_user_body, map_user, update_user_body, ExtensionMap};
use crate::{GraphError, GraphResult};

const MANAGER_SELECT: &str = "id,mail,userPrincipalName";

/// Remote directory gateway backed by Microsoft Graph.
#[derive(Debug)]
pub struct GraphGateway {
    client: GraphClient,
    config: GraphConfig,
    extensions: ExtensionMap,
}

impl GraphGateway {
    /// Creates a gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(credentials: Arc<dyn CredentialProvider>, config: GraphConfig) -> GraphResult<Self> {
        config.validate()?;
        let client = GraphClient::new(credentials, &config)?;
        let extensions = ExtensionMap::new(config.extension_app_id.clone());
        Ok(Self {
            client,
            config,
            extensions,
        })
    }

    fn user_url(&self, user_id: &str) -> String {
        format!(
            "{}/users/{}",
            self.client.base_url(),
            urlencoding::encode(user_id)
        )
    }

    /// Reads every user with the requested custom fields and role memberships.
    ///
    /// # Errors
    ///
    /// Returns an error if any page or the role listing fails, or custom fields
    /// are requested without an extension application.
    #[instrument(skip(self))]
    pub async fn list_users(&self, custom_fields: &[String]) -> GraphResult<Vec<ObservedRecord>> {
        let extensions = self.extensions.properties(custom_fields)?;

        let mut select = base_select();
        select.extend(extensions.iter().map(|(_, property)| property.clone()));
        let url = format!(
            "{}/users?$select={}&$expand=manager($select={MANAGER_SELECT})&$top=999",
            self.client.base_url(),
            select.join(",")
        );

        let mut users = Vec::new();
        self.client
            .get_paginated(&url, |page: Vec<Value>| {
                for value in page {
                    match map_user(&value, &extensions) {
                        Some(record) => users.push(record),
                        None => warn!("Skipping user object without an id"),
                    }
                }
                Ok(())
            })
            .await?;

        if self.config.include_roles {
            let mut memberships = fetch_role_memberships(&self.client).await?;
            for user in &mut users {
                if let Some(roles) = memberships.remove(&user.id) {
                    user.roles = roles;
                }
            }
        }

        info!(count = users.len(), "Listed directory users");
        Ok(users)
    }

    /// Sends one `$batch` call and splits the replies into successes and failures.
    ///
    /// Items whose request cannot be built fail individually without being sent.
    /// `on_response` sees every reply and decides whether the item succeeded.
    async fn run_batch<I, B, R>(
        &self,
        items: &[I],
        build: B,
        on_response: R,
    ) -> GraphResult<BatchOutcome<I, AccountRef>>
    where
        I: Clone,
        B: Fn(&I) -> GraphResult<BatchRequestItem>,
        R: Fn(&I, &BatchResponseItem) -> Result<AccountRef, String>,
    {
        let mut outcome = BatchOutcome::default();
        let mut sent = Vec::with_capacity(items.len());
        let mut requests = Vec::with_capacity(items.len());

        for item in items {
            match build(item) {
                Ok(mut request) => {
                    request.id = sent.len().to_string();
                    requests.push(request);
                    sent.push(item.clone());
                }
                Err(e) => outcome.add_failure(item.clone(), e.to_string()),
            }
        }

        let responses = execute_batch(&self.client, &requests).await?;
        for (item, response) in sent.into_iter().zip(responses) {
            match on_response(&item, &response) {
                Ok(account) => outcome.add_success(account),
                Err(e) => outcome.add_failure(item, e),
            }
        }

        Ok(outcome)
    }

    fn account_from_value(value: &Value) -> Option<AccountRef> {
        let id = value.get("id").and_then(|v| v.as_str())?;
        let email = value
            .get("mail")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .or_else(|| value.get("userPrincipalName").and_then(|v| v.as_str()))
            .unwrap_or_default();
        Some(AccountRef::new(id, email))
    }
}

fn succeeded(response: &BatchResponseItem) -> Result<(), String> {
    if response.is_success() {
        Ok(())
    } else {
        Err(response.error_message())
    }
}

/// Escapes a value for an `OData` string literal.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl DirectoryGateway for GraphGateway {
    fn max_batch_size(&self) -> usize {
        self.config.batch_limit
    }

    async fn list_accounts(&self, custom_fields: &[String]) -> GatewayResult<Vec<ObservedRecord>> {
        Ok(self.list_users(custom_fields).await?)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn create_many(
        &self,
        records: &[DesiredRecord],
    ) -> GatewayResult<BatchOutcome<DesiredRecord, AccountRef>> {
        let outcome = self
            .run_batch(
                records,
                |record| {
                    let body = create_user_body(record, &self.extensions)?;
                    Ok(BatchRequestItem::new("", "POST", "/users").with_body(body))
                },
                |record, response| {
                    succeeded(response)?;
                    response
                        .body_id()
                        .map(|id| AccountRef::new(id, record.email.trim()))
                        .ok_or_else(|| "Created user has no id in the response".to_string())
                },
            )
            .await?;
        debug!(
            created = outcome.successful.len(),
            failed = outcome.failed.len(),
            "Create batch resolved"
        );
        Ok(outcome)
    }

    #[instrument(skip(self, updates), fields(count = updates.len()))]
    async fn update_many(
        &self,
        updates: &[AccountUpdate],
    ) -> GatewayResult<BatchOutcome<AccountUpdate, AccountRef>> {
        Ok(self
            .run_batch(
                updates,
                |update| {
                    let body = update_user_body(update, &self.extensions)?;
                    let url = format!("/users/{}", urlencoding::encode(&update.user_id));
                    Ok(BatchRequestItem::new("", "PATCH", url).with_body(body))
                },
                |update, response| {
                    succeeded(response)?;
                    Ok(AccountRef::new(&update.user_id, &update.email))
                },
            )
            .await?)
    }

    #[instrument(skip(self, accounts), fields(count = accounts.len()))]
    async fn delete_many(
        &self,
        accounts: &[AccountRef],
    ) -> GatewayResult<BatchOutcome<AccountRef, AccountRef>> {
        Ok(self
            .run_batch(
                accounts,
                |account| {
                    let url = format!("/users/{}", urlencoding::encode(&account.id));
                    Ok(BatchRequestItem::new("", "DELETE", url))
                },
                |account, response| {
                    // A user that is already gone counts as deleted.
                    if response.status == 404 {
                        debug!(email = %account.email, "User already absent");
                        return Ok(account.clone());
                    }
                    succeeded(response)?;
                    Ok(account.clone())
                },
            )
            .await?)
    }

    #[instrument(skip(self))]
    async fn get_by_email(&self, email: &str) -> GatewayResult<Option<AccountRef>> {
        let literal = odata_literal(email.trim());
        let filter = format!("mail eq '{literal}' or userPrincipalName eq '{literal}'");
        let url = format!(
            "{}/users?$filter={}&$select={MANAGER_SELECT}",
            self.client.base_url(),
            urlencoding::encode(&filter)
        );

        let response: ODataResponse<Value> = self.client.get(&url).await?;
        Ok(response.value.iter().find_map(Self::account_from_value))
    }

    #[instrument(skip(self))]
    async fn get_manager_of(&self, user_id: &str) -> GatewayResult<Option<AccountRef>> {
        let url = format!("{}/manager?$select={MANAGER_SELECT}", self.user_url(user_id));
        let manager: Option<Value> = self.client.get_optional(&url).await?;
        Ok(manager.as_ref().and_then(Self::account_from_value))
    }

    #[instrument(skip(self))]
    async fn set_manager_ref(&self, user_id: &str, manager_id: &str) -> GatewayResult<()> {
        let url = format!("{}/manager/$ref", self.user_url(user_id));
        let body = json!({ "@odata.id": self.user_url(manager_id) });
        self.client.put(&url, &body).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_manager_ref(&self, user_id: &str) -> GatewayResult<()> {
        let url = format!("{}/manager/$ref", self.user_url(user_id));
        match self.client.delete(&url).await {
            Ok(()) | Err(GraphError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
