//! Delta calculation between desired and observed state.
//!
//! The calculator indexes both sides by lower-cased email and partitions the
//! union of keys into create, update, delete and no-change actions. Protected
//! accounts are dropped from the delete set before the delta is returned.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::model::{identity_key, AttributeValue, DesiredRecord, ManagerRef, ObservedRecord};
use crate::protection::{DeletionCandidate, ProtectedAccount, ProtectionPolicy};

/// Field name used for manager relationship changes.
pub const MANAGER_FIELD: &str = "manager";

/// A single attribute-level difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub field: String,
    pub old_value: Option<AttributeValue>,
    pub new_value: Option<AttributeValue>,
    pub is_custom_property: bool,
}

impl Change {
    /// Returns true if this change targets the manager relationship.
    #[must_use]
    pub fn is_manager(&self) -> bool {
        !self.is_custom_property && self.field == MANAGER_FIELD
    }
}

/// What should happen to one identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    NoChange,
}

impl ActionKind {
    /// Plan symbol for this action.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Delete => "-",
            Self::NoChange => "=",
        }
    }
}

/// An action on one identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Lower-cased email.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired: Option<DesiredRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<ObservedRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub changes: Vec<Change>,
}

impl Action {
    /// Email to show for this action, preferring the declared spelling.
    #[must_use]
    pub fn email(&self) -> &str {
        self.desired
            .as_ref()
            .map(|d| d.email.as_str())
            .or_else(|| self.observed.as_ref().map(|o| o.email.as_str()))
            .unwrap_or(&self.key)
    }

    /// Remote identifier, if the account already exists.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.observed.as_ref().map(|o| o.id.as_str())
    }

    /// The manager change carried by this action, if any.
    #[must_use]
    pub fn manager_change(&self) -> Option<&Change> {
        self.changes.iter().find(|c| c.is_manager())
    }

    /// Changes other than the manager relationship.
    pub fn attribute_changes(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(|c| !c.is_manager())
    }
}

/// The computed plan for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub create: Vec<Action>,
    pub update: Vec<Action>,
    pub delete: Vec<Action>,
    pub no_change: Vec<Action>,
    /// Accounts removed from the delete set by protection rules.
    pub protected: Vec<ProtectedAccount>,
}

impl Delta {
    /// Returns true if the plan contains no mutation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// All actions in plan order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.create
            .iter()
            .chain(self.update.iter())
            .chain(self.delete.iter())
            .chain(self.no_change.iter())
    }

    /// Identity keys scheduled for deletion.
    #[must_use]
    pub fn delete_keys(&self) -> BTreeSet<String> {
        self.delete.iter().map(|a| a.key.clone()).collect()
    }
}

/// Computes the delta between desired and observed state.
///
/// Standard attributes are compared only when the desired record declares them;
/// every field in `known_custom_fields` is compared, with a missing desired value
/// meaning "empty". The manager relationship is compared according to the
/// record's [`ManagerRef`].
///
/// # Errors
///
/// Returns [`ReconcileError::MissingIdentity`] for a desired record without an email
/// and [`ReconcileError::DuplicateKey`] when two desired records share an email.
pub fn calculate_delta(
    desired: &[DesiredRecord],
    known_custom_fields: &[String],
    observed: &[ObservedRecord],
    policy: &ProtectionPolicy,
) -> ReconcileResult<Delta> {
    let desired_index = index_desired(desired)?;
    let observed_index = index_observed(observed);

    let mut delta = Delta::default();

    for (key, record) in &desired_index {
        match observed_index.get(key) {
            None => delta.create.push(Action {
                kind: ActionKind::Create,
                key: key.clone(),
                desired: Some((*record).clone()),
                observed: None,
                changes: Vec::new(),
            }),
            Some(current) => {
                let changes = diff_record(record, current, known_custom_fields);
                let kind = if changes.is_empty() {
                    ActionKind::NoChange
                } else {
                    ActionKind::Update
                };
                let action = Action {
                    kind,
                    key: key.clone(),
                    desired: Some((*record).clone()),
                    observed: Some((*current).clone()),
                    changes,
                };
                if kind == ActionKind::Update {
                    delta.update.push(action);
                } else {
                    delta.no_change.push(action);
                }
            }
        }
    }

    let candidates: Vec<DeletionCandidate> = observed_index
        .iter()
        .filter(|(key, _)| !desired_index.contains_key(*key))
        .map(|(_, record)| DeletionCandidate {
            email: record.email.clone(),
            user_id: record.id.clone(),
            display_name: record.display_name.clone(),
            roles: record.roles.clone(),
        })
        .collect();

    let outcome = policy.filter_protected_accounts(&candidates);
    for account in &outcome.protected {
        debug!(email = %account.email, reason = %account.reason, "Account protected from deletion");
    }

    for allowed in outcome.allowed {
        let key = identity_key(&allowed.email);
        if let Some(current) = observed_index.get(&key) {
            delta.delete.push(Action {
                kind: ActionKind::Delete,
                key,
                desired: None,
                observed: Some((*current).clone()),
                changes: Vec::new(),
            });
        }
    }
    delta.protected = outcome.protected;

    debug!(
        create = delta.create.len(),
        update = delta.update.len(),
        delete = delta.delete.len(),
        unchanged = delta.no_change.len(),
        protected = delta.protected.len(),
        "Delta calculated"
    );

    Ok(delta)
}

/// Checks the desired records for missing or duplicate identity keys.
///
/// # Errors
///
/// Same configuration errors as [`calculate_delta`].
pub fn validate_desired(desired: &[DesiredRecord]) -> ReconcileResult<()> {
    index_desired(desired).map(|_| ())
}

fn index_desired(desired: &[DesiredRecord]) -> ReconcileResult<BTreeMap<String, &DesiredRecord>> {
    let mut index: BTreeMap<String, &DesiredRecord> = BTreeMap::new();
    let mut positions: BTreeMap<String, usize> = BTreeMap::new();

    for (position, record) in desired.iter().enumerate() {
        let key = record.key();
        if key.is_empty() {
            return Err(ReconcileError::MissingIdentity { index: position + 1 });
        }
        if let Some(first) = positions.get(&key) {
            return Err(ReconcileError::DuplicateKey {
                key,
                first: *first,
                second: position + 1,
            });
        }
        positions.insert(key.clone(), position + 1);
        index.insert(key, record);
    }

    Ok(index)
}

fn index_observed(observed: &[ObservedRecord]) -> BTreeMap<String, &ObservedRecord> {
    let mut index: BTreeMap<String, &ObservedRecord> = BTreeMap::new();

    for record in observed {
        let key = record.key();
        if key.is_empty() {
            warn!(user_id = %record.id, "Remote account has no email, ignoring");
            continue;
        }
        if let Some(existing) = index.get(&key) {
            warn!(
                email = %key,
                kept = %existing.id,
                ignored = %record.id,
                "Multiple remote accounts share an email, keeping the first"
            );
            continue;
        }
        index.insert(key, record);
    }

    index
}

fn diff_record(
    desired: &DesiredRecord,
    observed: &ObservedRecord,
    known_custom_fields: &[String],
) -> Vec<Change> {
    let mut changes = Vec::new();

    for (field, value) in &desired.attributes {
        let current = observed.attributes.get(field);
        if !AttributeValue::semantically_equal(Some(value), current) {
            changes.push(Change {
                field: field.clone(),
                old_value: current.cloned(),
                new_value: (!value.is_blank()).then(|| value.clone()),
                is_custom_property: false,
            });
        }
    }

    let custom_fields: BTreeSet<&String> = known_custom_fields.iter().collect();
    for field in custom_fields {
        let wanted = desired.custom.get(field).map(AttributeValue::scalar);
        let current = observed.custom.get(field).map(AttributeValue::scalar);
        if !AttributeValue::semantically_equal(wanted.as_ref(), current.as_ref()) {
            changes.push(Change {
                field: field.clone(),
                old_value: current.filter(|v| !v.is_blank()),
                new_value: wanted.filter(|v| !v.is_blank()),
                is_custom_property: true,
            });
        }
    }

    if let Some(change) = diff_manager(&desired.manager, observed) {
        changes.push(change);
    }

    changes
}

fn diff_manager(wanted: &ManagerRef, observed: &ObservedRecord) -> Option<Change> {
    let current = observed
        .manager_email
        .clone()
        .or_else(|| observed.manager_id.clone())
        .map(AttributeValue::Scalar);

    match wanted {
        ManagerRef::Unspecified => None,
        ManagerRef::Clear => observed.manager_id.is_some().then(|| Change {
            field: MANAGER_FIELD.to_string(),
            old_value: current,
            new_value: None,
            is_custom_property: false,
        }),
        ManagerRef::Set(email) => {
            let unchanged = observed.manager_id.is_some()
                && observed
                    .manager_email
                    .as_deref()
                    .is_some_and(|m| identity_key(m) == identity_key(email));
            (!unchanged).then(|| Change {
                field: MANAGER_FIELD.to_string(),
                old_value: current,
                new_value: Some(AttributeValue::Scalar(email.trim().to_string())),
                is_custom_property: false,
            })
        }
    }
}
