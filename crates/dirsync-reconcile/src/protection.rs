//! Account protection rules.
//!
//! Protected accounts are removed from the deletion set no matter whether they
//! appear in the desired state. Filtering is pure: the same candidates always
//! produce the same partition.

use serde::{Deserialize, Serialize};

use crate::model::identity_key;

/// A single protection rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ProtectionRule {
    /// Exact email match.
    Email(String),
    /// Every account whose email is in this domain.
    Domain(String),
    /// Every account holding this directory role.
    Role(String),
    /// The identity the tool authenticates as.
    Operator(String),
}

/// Why a rule matched.
struct RuleMatch {
    reason: String,
    role: Option<String>,
}

impl ProtectionRule {
    fn evaluate(&self, candidate: &DeletionCandidate) -> Option<RuleMatch> {
        let email = identity_key(&candidate.email);
        match self {
            Self::Email(protected) if identity_key(protected) == email => Some(RuleMatch {
                reason: "Email is on the protected list".to_string(),
                role: None,
            }),
            Self::Domain(domain) => {
                let domain = domain.trim().trim_start_matches('@').to_lowercase();
                let account_domain = email.rsplit_once('@').map(|(_, d)| d)?;
                (account_domain == domain).then(|| RuleMatch {
                    reason: format!("Domain '{domain}' is protected"),
                    role: None,
                })
            }
            Self::Role(role) => candidate
                .roles
                .iter()
                .find(|held| held.trim().eq_ignore_ascii_case(role.trim()))
                .map(|held| RuleMatch {
                    reason: format!("Holds protected role '{held}'"),
                    role: Some(held.clone()),
                }),
            Self::Operator(operator) if identity_key(operator) == email => Some(RuleMatch {
                reason: "Account is the authenticated operator".to_string(),
                role: None,
            }),
            _ => None,
        }
    }
}

/// An account targeted for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionCandidate {
    pub email: String,
    pub user_id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// An account that was kept out of the deletion set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedAccount {
    pub email: String,
    pub user_id: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Partition of deletion candidates into allowed and protected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionOutcome {
    pub allowed: Vec<DeletionCandidate>,
    pub protected: Vec<ProtectedAccount>,
}

/// An ordered set of protection rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionPolicy {
    rules: Vec<ProtectionRule>,
}

impl ProtectionPolicy {
    pub fn new(rules: Vec<ProtectionRule>) -> Self {
        Self { rules }
    }

    /// A policy that protects nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rule(mut self, rule: ProtectionRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[ProtectionRule] {
        &self.rules
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Splits candidates into deletable and protected accounts.
    ///
    /// Rules are evaluated in order; the first match supplies the reason.
    #[must_use]
    pub fn filter_protected_accounts(&self, candidates: &[DeletionCandidate]) -> ProtectionOutcome {
        let mut outcome = ProtectionOutcome::default();

        for candidate in candidates {
            match self.rules.iter().find_map(|rule| rule.evaluate(candidate)) {
                Some(hit) => outcome.protected.push(ProtectedAccount {
                    email: candidate.email.clone(),
                    user_id: candidate.user_id.clone(),
                    reason: hit.reason,
                    role: hit.role,
                }),
                None => outcome.allowed.push(candidate.clone()),
            }
        }

        outcome
    }
}
