//! Remote directory boundary.
//!
//! The engine talks to the directory only through [`DirectoryGateway`]. Batched
//! calls report per-item results; an `Err` from a batched call means the whole
//! batch was rejected.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::delta::{Action, Change};
use crate::error::GatewayResult;
use crate::model::{AccountRef, AttributeValue, DesiredRecord, ObservedRecord};

/// An item that a remote operation failed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem<T> {
    pub item: T,
    pub error: String,
}

/// Per-item results of one batched call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome<I, O> {
    pub successful: Vec<O>,
    pub failed: Vec<FailedItem<I>>,
}

impl<I, O> Default for BatchOutcome<I, O> {
    fn default() -> Self {
        Self {
            successful: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<I, O> BatchOutcome<I, O> {
    pub fn add_success(&mut self, output: O) {
        self.successful.push(output);
    }

    pub fn add_failure(&mut self, item: I, error: impl Into<String>) {
        self.failed.push(FailedItem {
            item,
            error: error.into(),
        });
    }

    /// Appends another outcome to this one.
    pub fn merge(&mut self, other: Self) {
        self.successful.extend(other.successful);
        self.failed.extend(other.failed);
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

/// Attribute changes to apply to an existing account.
///
/// `None` values clear the attribute remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub user_id: String,
    pub email: String,
    pub attributes: BTreeMap<String, Option<AttributeValue>>,
    pub custom: BTreeMap<String, Option<String>>,
}

impl AccountUpdate {
    /// Builds the attribute update for an update action, ignoring manager changes.
    #[must_use]
    pub fn from_action(action: &Action) -> Option<Self> {
        let user_id = action.user_id()?.to_string();
        let mut update = Self {
            user_id,
            email: action.email().to_string(),
            ..Self::default()
        };
        for change in action.attribute_changes() {
            update.apply_change(change);
        }
        Some(update)
    }

    fn apply_change(&mut self, change: &Change) {
        if change.is_custom_property {
            self.custom.insert(
                change.field.clone(),
                change.new_value.as_ref().map(ToString::to_string),
            );
        } else {
            self.attributes
                .insert(change.field.clone(), change.new_value.clone());
        }
    }

    /// Returns true if there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.custom.is_empty()
    }
}

/// Operations the engine needs from a remote directory.
#[async_trait]
pub trait DirectoryGateway: Send + Sync {
    /// Largest number of items accepted by one batched call.
    fn max_batch_size(&self) -> usize;

    /// Reads every account, including the given custom fields.
    async fn list_accounts(&self, custom_fields: &[String]) -> GatewayResult<Vec<ObservedRecord>>;

    /// Creates accounts. Successful items carry the new remote identifier.
    async fn create_many(
        &self,
        records: &[DesiredRecord],
    ) -> GatewayResult<BatchOutcome<DesiredRecord, AccountRef>>;

    /// Applies attribute updates.
    async fn update_many(
        &self,
        updates: &[AccountUpdate],
    ) -> GatewayResult<BatchOutcome<AccountUpdate, AccountRef>>;

    /// Deletes accounts.
    async fn delete_many(
        &self,
        accounts: &[AccountRef],
    ) -> GatewayResult<BatchOutcome<AccountRef, AccountRef>>;

    /// Looks up a single account by email. `Ok(None)` if it does not exist.
    async fn get_by_email(&self, email: &str) -> GatewayResult<Option<AccountRef>>;

    /// Returns the manager of an account, if it has one.
    async fn get_manager_of(&self, user_id: &str) -> GatewayResult<Option<AccountRef>>;

    /// Points an account's manager at `manager_id`.
    async fn set_manager_ref(&self, user_id: &str, manager_id: &str) -> GatewayResult<()>;

    /// Removes an account's manager relationship.
    async fn clear_manager_ref(&self, user_id: &str) -> GatewayResult<()>;
}
