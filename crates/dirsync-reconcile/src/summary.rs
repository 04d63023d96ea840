//! Run summary aggregation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The remote operation an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
    AssignManager,
    ClearManager,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::AssignManager => "assign manager",
            Self::ClearManager => "clear manager",
        };
        f.write_str(name)
    }
}

/// One failed remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub operation: Operation,
    pub email: String,
    pub error: String,
}

/// Counts and diagnostics for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub protected: usize,
    /// Planned actions not attempted because their phase was skipped.
    pub skipped: usize,
    pub managers_assigned: usize,
    pub managers_cleared: usize,
    pub failures: Vec<OperationFailure>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn record_failure(
        &mut self,
        operation: Operation,
        email: impl Into<String>,
        error: impl Into<String>,
    ) {
        self.failures.push(OperationFailure {
            operation,
            email: email.into(),
            error: error.into(),
        });
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Process exit code: non-zero iff any applied operation failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_failures())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} unchanged, {} protected, {} errors, {} warnings",
            self.created,
            self.updated,
            self.deleted,
            self.unchanged,
            self.protected,
            self.error_count(),
            self.warnings.len()
        )
    }
}
