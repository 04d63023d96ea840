//! Desired and observed account records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Normalizes an email into the case-insensitive identity key used for matching.
#[must_use]
pub fn identity_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A standard attribute value: a single scalar or a list of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Scalar(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// Creates a scalar value.
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Creates a list value.
    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// Returns the value as an unordered set of trimmed, non-empty scalars.
    ///
    /// A scalar `"x"` and a one-element list `["x"]` normalize to the same set,
    /// and blank values normalize to the empty set.
    #[must_use]
    pub fn normalized(&self) -> BTreeSet<String> {
        match self {
            Self::Scalar(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    BTreeSet::new()
                } else {
                    BTreeSet::from([trimmed.to_string()])
                }
            }
            Self::List(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Returns true if the value carries no data once trimmed.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.normalized().is_empty()
    }

    /// Semantic equality between two optional values.
    ///
    /// Absent and blank are equal; lists compare as sets; strings are trimmed.
    #[must_use]
    pub fn semantically_equal(a: Option<&Self>, b: Option<&Self>) -> bool {
        let left = a.map(Self::normalized).unwrap_or_default();
        let right = b.map(Self::normalized).unwrap_or_default();
        left == right
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "{}", items.join("; ")),
        }
    }
}

/// The manager reference declared for a desired account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "email", rename_all = "snake_case")]
pub enum ManagerRef {
    /// The source did not declare a manager column: leave the relationship as is.
    #[default]
    Unspecified,
    /// The source declared an empty manager: remove any existing relationship.
    Clear,
    /// The source declared a manager by email.
    Set(String),
}

impl ManagerRef {
    /// Builds a reference from a raw cell value of a present manager column.
    #[must_use]
    pub fn from_cell(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Self::Clear
        } else {
            Self::Set(trimmed.to_string())
        }
    }

    /// The manager's identity key, if one is set.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        match self {
            Self::Set(email) => Some(identity_key(email)),
            _ => None,
        }
    }
}

/// One declared account, as parsed from the desired-state source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredRecord {
    pub email: String,
    /// Standard schema attributes present in the source.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub manager: ManagerRef,
    /// Attributes outside the standard schema.
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

impl DesiredRecord {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            attributes: BTreeMap::new(),
            manager: ManagerRef::Unspecified,
            custom: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_manager(mut self, manager: ManagerRef) -> Self {
        self.manager = manager;
        self
    }

    #[must_use]
    pub fn with_custom(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn key(&self) -> String {
        identity_key(&self.email)
    }

    /// Display name declared for this record, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        self.attributes
            .get("displayName")
            .map(ToString::to_string)
            .filter(|s| !s.trim().is_empty())
    }
}

/// One remote account as read during planning. Never mutated after the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRecord {
    /// Opaque remote identifier.
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
    #[serde(default)]
    pub manager_id: Option<String>,
    /// Manager email, resolved from `manager_id` by a secondary lookup.
    #[serde(default)]
    pub manager_email: Option<String>,
    /// Directory roles held by the account.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ObservedRecord {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
            attributes: BTreeMap::new(),
            custom: BTreeMap::new(),
            manager_id: None,
            manager_email: None,
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_custom(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_manager(mut self, id: impl Into<String>, email: Option<&str>) -> Self {
        self.manager_id = Some(id.into());
        self.manager_email = email.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    #[must_use]
    pub fn key(&self) -> String {
        identity_key(&self.email)
    }
}

/// A remote account reference: identifier plus identity email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: String,
    pub email: String,
}

impl AccountRef {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

impl From<&ObservedRecord> for AccountRef {
    fn from(record: &ObservedRecord) -> Self {
        Self::new(record.id.clone(), record.email.clone())
    }
}

/// The declared state for one run: records plus the custom field names found in the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    pub records: Vec<DesiredRecord>,
    pub custom_fields: Vec<String>,
}

impl DesiredState {
    pub fn new(records: Vec<DesiredRecord>, custom_fields: Vec<String>) -> Self {
        Self {
            records,
            custom_fields,
        }
    }
}
