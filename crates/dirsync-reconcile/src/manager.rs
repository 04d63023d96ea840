//! Manager relationship resolution.
//!
//! Runs after the create and update phases have settled. Manager emails are
//! resolved to remote identifiers in priority order:
//!
//! 1. accounts created or updated in this run,
//! 2. accounts in the planning snapshot,
//! 3. a point lookup against the remote directory.
//!
//! An unresolvable manager produces a warning for that user only.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::delta::Action;
use crate::gateway::DirectoryGateway;
use crate::model::{identity_key, AccountRef, DesiredRecord, ManagerRef, ObservedRecord};

/// What should happen to one account's manager relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerRequest {
    Assign { user: AccountRef, manager_email: String },
    Remove { user: AccountRef },
}

/// Point `user_id` at `manager_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerAssignment {
    pub user_id: String,
    pub user_email: String,
    pub manager_id: String,
    pub manager_email: String,
}

/// Remove `user_id`'s manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerRemoval {
    pub user_id: String,
    pub user_email: String,
}

/// Resolved manager instructions plus the warnings raised while resolving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerPlan {
    pub assignments: Vec<ManagerAssignment>,
    pub removals: Vec<ManagerRemoval>,
    pub warnings: Vec<String>,
}

impl ManagerPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.removals.is_empty()
    }
}

/// Builds manager requests for the accounts that were successfully written.
///
/// Created accounts only get an assignment when a manager is set. Updated
/// accounts follow their manager change: a new value reassigns, no value removes.
#[must_use]
pub fn collect_requests(
    created: &[(AccountRef, &DesiredRecord)],
    updated: &[&Action],
) -> Vec<ManagerRequest> {
    let mut requests = Vec::new();

    for (account, record) in created {
        if let ManagerRef::Set(email) = &record.manager {
            requests.push(ManagerRequest::Assign {
                user: account.clone(),
                manager_email: email.clone(),
            });
        }
    }

    for action in updated {
        let (Some(change), Some(user_id)) = (action.manager_change(), action.user_id()) else {
            continue;
        };
        let user = AccountRef::new(user_id, action.email());
        match &change.new_value {
            Some(value) => requests.push(ManagerRequest::Assign {
                user,
                manager_email: value.to_string(),
            }),
            None => requests.push(ManagerRequest::Remove { user }),
        }
    }

    requests
}

/// Resolves manager emails to remote identifiers.
pub struct ManagerResolver<'a> {
    gateway: &'a dyn DirectoryGateway,
    in_run: HashMap<String, String>,
    snapshot: HashMap<String, String>,
    pending_deletion: HashSet<String>,
    lookups: HashMap<String, Result<Option<String>, String>>,
}

impl<'a> ManagerResolver<'a> {
    pub fn new(gateway: &'a dyn DirectoryGateway) -> Self {
        Self {
            gateway,
            in_run: HashMap::new(),
            snapshot: HashMap::new(),
            pending_deletion: HashSet::new(),
            lookups: HashMap::new(),
        }
    }

    /// Registers accounts written in this run.
    #[must_use]
    pub fn with_written(mut self, accounts: &[AccountRef]) -> Self {
        for account in accounts {
            self.in_run
                .insert(identity_key(&account.email), account.id.clone());
        }
        self
    }

    /// Registers the planning snapshot.
    #[must_use]
    pub fn with_snapshot(mut self, observed: &[ObservedRecord]) -> Self {
        for record in observed {
            self.snapshot
                .entry(record.key())
                .or_insert_with(|| record.id.clone());
        }
        self
    }

    /// Registers accounts that the delete phase is about to remove.
    #[must_use]
    pub fn with_pending_deletion<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.pending_deletion.extend(keys);
        self
    }

    /// Turns requests into assignment and removal instructions.
    pub async fn resolve(&mut self, requests: &[ManagerRequest]) -> ManagerPlan {
        let mut plan = ManagerPlan::default();

        for request in requests {
            match request {
                ManagerRequest::Remove { user } => plan.removals.push(ManagerRemoval {
                    user_id: user.id.clone(),
                    user_email: user.email.clone(),
                }),
                ManagerRequest::Assign {
                    user,
                    manager_email,
                } => match self.resolve_one(user, manager_email).await {
                    Ok(manager_id) => plan.assignments.push(ManagerAssignment {
                        user_id: user.id.clone(),
                        user_email: user.email.clone(),
                        manager_id,
                        manager_email: manager_email.clone(),
                    }),
                    Err(warning) => {
                        warn!(user = %user.email, manager = %manager_email, "{warning}");
                        plan.warnings.push(warning);
                    }
                },
            }
        }

        plan
    }

    async fn resolve_one(&mut self, user: &AccountRef, manager_email: &str) -> Result<String, String> {
        let key = identity_key(manager_email);

        if key == identity_key(&user.email) {
            return Err(format!(
                "{} cannot be their own manager; relationship not set",
                user.email
            ));
        }
        if self.pending_deletion.contains(&key) {
            return Err(format!(
                "Manager {manager_email} of {} is being deleted; relationship not set",
                user.email
            ));
        }
        if let Some(id) = self.in_run.get(&key).or_else(|| self.snapshot.get(&key)) {
            debug!(manager = %key, manager_id = %id, "Manager resolved locally");
            return Ok(id.clone());
        }

        let lookup = match self.lookups.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let result = self
                    .gateway
                    .get_by_email(&key)
                    .await
                    .map(|found| found.map(|account| account.id))
                    .map_err(|e| e.to_string());
                self.lookups.insert(key.clone(), result.clone());
                result
            }
        };

        match lookup {
            Ok(Some(id)) => Ok(id),
            Ok(None) => Err(format!(
                "Manager {manager_email} of {} not found; relationship not set",
                user.email
            )),
            Err(e) => Err(format!(
                "Manager lookup for {manager_email} of {} failed: {e}",
                user.email
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{ActionKind, Change, MANAGER_FIELD};
    use crate::model::AttributeValue;

    fn update_with_manager(new_value: Option<&str>) -> Action {
        Action {
            kind: ActionKind::Update,
            key: "a@x.com".into(),
            desired: Some(DesiredRecord::new("a@x.com")),
            observed: Some(ObservedRecord::new("u-a", "a@x.com").with_manager("m1", Some("m@x.com"))),
            changes: vec![Change {
                field: MANAGER_FIELD.into(),
                old_value: Some(AttributeValue::scalar("m@x.com")),
                new_value: new_value.map(AttributeValue::scalar),
                is_custom_property: false,
            }],
        }
    }

    #[test]
    fn test_created_with_manager_requests_assignment() {
        let record = DesiredRecord::new("a@x.com").with_manager(ManagerRef::Set("m@x.com".into()));
        let plain = DesiredRecord::new("b@x.com").with_manager(ManagerRef::Clear);
        let created = vec![
            (AccountRef::new("u-a", "a@x.com"), &record),
            (AccountRef::new("u-b", "b@x.com"), &plain),
        ];

        let requests = collect_requests(&created, &[]);
        assert_eq!(
            requests,
            vec![ManagerRequest::Assign {
                user: AccountRef::new("u-a", "a@x.com"),
                manager_email: "m@x.com".into(),
            }]
        );
    }

    #[test]
    fn test_cleared_manager_requests_removal() {
        let action = update_with_manager(None);
        let requests = collect_requests(&[], &[&action]);
        assert_eq!(
            requests,
            vec![ManagerRequest::Remove {
                user: AccountRef::new("u-a", "a@x.com"),
            }]
        );
    }

    #[test]
    fn test_changed_manager_requests_reassignment() {
        let action = update_with_manager(Some("n@x.com"));
        let requests = collect_requests(&[], &[&action]);
        assert!(matches!(
            &requests[0],
            ManagerRequest::Assign { manager_email, .. } if manager_email == "n@x.com"
        ));
    }

    #[test]
    fn test_update_without_manager_change_requests_nothing() {
        let mut action = update_with_manager(None);
        action.changes[0].field = "jobTitle".into();
        assert!(collect_requests(&[], &[&action]).is_empty());
    }
}
