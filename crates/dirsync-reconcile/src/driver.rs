//! Reconciliation driver.
//!
//! One run moves through `Planning`, then stops at `Reported` (dry run) or
//! `AwaitingConfirmation` (unconfirmed deletes), or continues through
//! `Applying` and `Summarizing` to `Done`. Phases apply in a fixed order:
//! create, update, manager wiring, delete.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::batch::{dispatch_batches, BatchPolicy};
use crate::delta::{calculate_delta, validate_desired, Action, Delta};
use crate::error::{ReconcileError, ReconcileResult};
use crate::gateway::{AccountUpdate, DirectoryGateway};
use crate::manager::{collect_requests, ManagerResolver};
use crate::model::{identity_key, AccountRef, DesiredRecord, DesiredState, ObservedRecord};
use crate::protection::ProtectionPolicy;
use crate::summary::{Operation, RunSummary};

/// Caller intent for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Plan only, never mutate.
    pub dry_run: bool,
    /// Apply deletes without the confirmation gate.
    pub force: bool,
    pub skip_create: bool,
    pub skip_update: bool,
    pub skip_delete: bool,
    pub batch_size: usize,
    /// Pause between consecutive batch dispatches.
    pub batch_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            skip_create: false,
            skip_update: false,
            skip_delete: false,
            batch_size: 20,
            batch_delay: Duration::from_millis(500),
        }
    }
}

impl RunOptions {
    fn validate(&self) -> ReconcileResult<()> {
        if self.batch_size == 0 {
            return Err(ReconcileError::InvalidOptions(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy::new(self.batch_size, self.batch_delay)
    }
}

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    /// Dry run: the plan was produced and nothing was mutated.
    Reported,
    /// Deletes are pending and the caller has not confirmed them.
    AwaitingConfirmation,
    Applying,
    Summarizing,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::Reported => "reported",
            Self::AwaitingConfirmation => "awaiting confirmation",
            Self::Applying => "applying",
            Self::Summarizing => "summarizing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// The planning result: the snapshot it was computed from and the delta.
#[derive(Debug, Clone)]
pub struct Plan {
    pub observed: Vec<ObservedRecord>,
    pub delta: Delta,
    pub warnings: Vec<String>,
}

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub phase: RunPhase,
    pub delta: Delta,
    /// Warnings raised while planning.
    pub warnings: Vec<String>,
    /// Present only when the run applied changes.
    pub summary: Option<RunSummary>,
}

impl RunReport {
    /// Process exit code for this run.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.summary.as_ref().map_or(0, RunSummary::exit_code)
    }
}

/// Drives one reconciliation run against a directory gateway.
pub struct Reconciler {
    gateway: Arc<dyn DirectoryGateway>,
    policy: ProtectionPolicy,
    options: RunOptions,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn DirectoryGateway>,
        policy: ProtectionPolicy,
        options: RunOptions,
    ) -> Self {
        Self {
            gateway,
            policy,
            options,
        }
    }

    /// Runs planning and, unless stopped by a gate, applies the delta.
    ///
    /// # Errors
    ///
    /// Fails only on configuration errors and when the remote listing cannot be
    /// read. Remote item and batch failures are reported in the summary.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, desired: &DesiredState) -> ReconcileResult<RunReport> {
        self.options.validate()?;

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        debug!(phase = %RunPhase::Planning, "Run started");

        let plan = self.plan(desired).await?;

        if self.options.dry_run {
            info!(
                create = plan.delta.create.len(),
                update = plan.delta.update.len(),
                delete = plan.delta.delete.len(),
                "Dry run, no changes applied"
            );
            return Ok(RunReport {
                run_id,
                phase: RunPhase::Reported,
                delta: plan.delta,
                warnings: plan.warnings,
                summary: None,
            });
        }

        if self.needs_confirmation(&plan.delta) {
            warn!(
                delete = plan.delta.delete.len(),
                "Deletes pending confirmation, nothing applied"
            );
            return Ok(RunReport {
                run_id,
                phase: RunPhase::AwaitingConfirmation,
                delta: plan.delta,
                warnings: plan.warnings,
                summary: None,
            });
        }

        debug!(phase = %RunPhase::Applying, "Applying delta");
        let summary = self.apply(&plan).await;

        debug!(phase = %RunPhase::Summarizing, "Summarizing run");
        info!(
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            protected = summary.protected,
            errors = summary.error_count(),
            warnings = summary.warnings.len(),
            "Reconciliation finished"
        );

        Ok(RunReport {
            run_id,
            phase: RunPhase::Done,
            delta: plan.delta,
            warnings: plan.warnings,
            summary: Some(summary),
        })
    }

    /// Reads the remote directory once and computes the delta.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from the delta calculation and
    /// [`ReconcileError::Listing`] if the listing fails.
    pub async fn plan(&self, desired: &DesiredState) -> ReconcileResult<Plan> {
        validate_desired(&desired.records)?;

        let mut observed = self
            .gateway
            .list_accounts(&desired.custom_fields)
            .await
            .map_err(ReconcileError::Listing)?;
        debug!(accounts = observed.len(), "Remote directory listed");

        let warnings = self.hydrate_managers(&mut observed).await;

        let delta = calculate_delta(
            &desired.records,
            &desired.custom_fields,
            &observed,
            &self.policy,
        )?;

        Ok(Plan {
            observed,
            delta,
            warnings,
        })
    }

    fn needs_confirmation(&self, delta: &Delta) -> bool {
        !delta.delete.is_empty() && !self.options.force && !self.options.skip_delete
    }

    /// Fills in manager emails for accounts that only carry a manager ID.
    async fn hydrate_managers(&self, observed: &mut [ObservedRecord]) -> Vec<String> {
        let emails_by_id: HashMap<String, String> = observed
            .iter()
            .map(|r| (r.id.clone(), r.email.clone()))
            .collect();
        let mut warnings = Vec::new();

        for record in observed.iter_mut() {
            let Some(manager_id) = record.manager_id.clone() else {
                continue;
            };
            if record.manager_email.is_some() {
                continue;
            }
            if let Some(email) = emails_by_id.get(&manager_id) {
                record.manager_email = Some(email.clone());
                continue;
            }
            match self.gateway.get_manager_of(&record.id).await {
                Ok(Some(manager)) => record.manager_email = Some(manager.email),
                Ok(None) => {}
                Err(e) => {
                    let warning = format!("Could not resolve manager of {}: {e}", record.email);
                    warn!(user = %record.email, error = %e, "Manager lookup failed");
                    warnings.push(warning);
                }
            }
        }

        warnings
    }

    async fn apply(&self, plan: &Plan) -> RunSummary {
        let delta = &plan.delta;
        let gateway = self.gateway.as_ref();
        let policy = self
            .options
            .batch_policy()
            .capped_at(gateway.max_batch_size());

        let mut summary = RunSummary {
            unchanged: delta.no_change.len(),
            protected: delta.protected.len(),
            warnings: plan.warnings.clone(),
            ..RunSummary::default()
        };
        let mut written: Vec<AccountRef> = Vec::new();

        // Create
        let mut created: Vec<(AccountRef, &DesiredRecord)> = Vec::new();
        if self.options.skip_create {
            summary.skipped += delta.create.len();
        } else {
            let desired_by_key: BTreeMap<String, &DesiredRecord> = delta
                .create
                .iter()
                .filter_map(|a| a.desired.as_ref().map(|d| (a.key.clone(), d)))
                .collect();
            let records: Vec<DesiredRecord> = desired_by_key.values().map(|d| (*d).clone()).collect();

            let outcome = dispatch_batches("create", records, policy, move |chunk| async move {
                gateway.create_many(&chunk).await
            })
            .await;

            for failed in outcome.failed {
                error!(email = %failed.item.email, error = %failed.error, "Create failed");
                summary.record_failure(Operation::Create, failed.item.email, failed.error);
            }
            summary.created = outcome.successful.len();
            for account in outcome.successful {
                if let Some(record) = desired_by_key.get(&identity_key(&account.email)) {
                    created.push((account.clone(), *record));
                }
                written.push(account);
            }
            info!(created = summary.created, "Create phase complete");
        }

        // Update
        let mut updated: Vec<&Action> = Vec::new();
        let mut manager_only: HashSet<String> = HashSet::new();
        if self.options.skip_update {
            summary.skipped += delta.update.len();
        } else {
            let mut patches = Vec::new();
            for action in &delta.update {
                match AccountUpdate::from_action(action) {
                    Some(update) if update.is_empty() => {
                        manager_only.insert(update.user_id);
                        updated.push(action);
                    }
                    Some(update) => patches.push(update),
                    None => summary.record_failure(
                        Operation::Update,
                        action.email(),
                        "remote account identifier missing",
                    ),
                }
            }

            let outcome = dispatch_batches("update", patches, policy, move |chunk| async move {
                gateway.update_many(&chunk).await
            })
            .await;

            for failed in outcome.failed {
                error!(email = %failed.item.email, error = %failed.error, "Update failed");
                summary.record_failure(Operation::Update, failed.item.email, failed.error);
            }
            let patched: HashSet<&str> = outcome.successful.iter().map(|a| a.id.as_str()).collect();
            updated.extend(
                delta
                    .update
                    .iter()
                    .filter(|a| a.user_id().is_some_and(|id| patched.contains(id))),
            );
            summary.updated = patched.len();
            written.extend(outcome.successful.iter().cloned());
        }

        // Manager wiring, after creates and updates have settled
        let requests = collect_requests(&created, &updated);
        let mut managers_ok: HashSet<String> = HashSet::new();
        if !requests.is_empty() {
            let pending: HashSet<String> = if self.options.skip_delete {
                HashSet::new()
            } else {
                delta.delete_keys().into_iter().collect()
            };
            let mut resolver = ManagerResolver::new(gateway)
                .with_written(&written)
                .with_snapshot(&plan.observed)
                .with_pending_deletion(pending);
            let manager_plan = resolver.resolve(&requests).await;
            summary.warnings.extend(manager_plan.warnings);

            for assignment in &manager_plan.assignments {
                match gateway
                    .set_manager_ref(&assignment.user_id, &assignment.manager_id)
                    .await
                {
                    Ok(()) => {
                        summary.managers_assigned += 1;
                        managers_ok.insert(assignment.user_id.clone());
                    }
                    Err(e) => {
                        error!(user = %assignment.user_email, manager = %assignment.manager_email, error = %e, "Manager assignment failed");
                        summary.record_failure(
                            Operation::AssignManager,
                            assignment.user_email.clone(),
                            e.to_string(),
                        );
                    }
                }
            }
            for removal in &manager_plan.removals {
                match gateway.clear_manager_ref(&removal.user_id).await {
                    Ok(()) => {
                        summary.managers_cleared += 1;
                        managers_ok.insert(removal.user_id.clone());
                    }
                    Err(e) => {
                        error!(user = %removal.user_email, error = %e, "Manager removal failed");
                        summary.record_failure(
                            Operation::ClearManager,
                            removal.user_email.clone(),
                            e.to_string(),
                        );
                    }
                }
            }
        }
        summary.updated += manager_only.intersection(&managers_ok).count();
        if !self.options.skip_update {
            info!(updated = summary.updated, "Update phase complete");
        }

        // Delete
        if self.options.skip_delete {
            summary.skipped += delta.delete.len();
        } else {
            let targets: Vec<AccountRef> = delta
                .delete
                .iter()
                .filter_map(|a| a.observed.as_ref().map(AccountRef::from))
                .collect();

            let outcome = dispatch_batches("delete", targets, policy, move |chunk| async move {
                gateway.delete_many(&chunk).await
            })
            .await;

            for failed in outcome.failed {
                error!(email = %failed.item.email, error = %failed.error, "Delete failed");
                summary.record_failure(Operation::Delete, failed.item.email, failed.error);
            }
            summary.deleted = outcome.successful.len();
            info!(deleted = summary.deleted, "Delete phase complete");
        }

        summary
    }
}
