//! State reconciliation engine for directory user accounts.
//!
//! Compares a declared set of accounts against a remote directory, computes a
//! create/update/delete delta (including manager relationships and custom
//! properties), applies it through a [`DirectoryGateway`] in bounded batches and
//! reports the outcome.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dirsync_reconcile::{
//!     DesiredRecord, DesiredState, DirectoryGateway, ProtectionPolicy, Reconciler, RunOptions,
//! };
//!
//! # async fn example(gateway: Arc<dyn DirectoryGateway>) -> Result<(), Box<dyn std::error::Error>> {
//! let desired = DesiredState::new(vec![DesiredRecord::new("a@example.com")], vec![]);
//! let reconciler = Reconciler::new(gateway, ProtectionPolicy::none(), RunOptions::default());
//! let report = reconciler.run(&desired).await?;
//! println!("{:?}", report.phase);
//! # Ok(())
//! # }
//! ```

mod batch;
mod delta;
mod driver;
mod error;
mod gateway;
mod manager;
mod model;
mod protection;
mod report;
mod summary;

pub use batch::{dispatch_batches, BatchPolicy};
pub use delta::{calculate_delta, validate_desired, Action, ActionKind, Change, Delta, MANAGER_FIELD};
pub use driver::{Plan, Reconciler, RunOptions, RunPhase, RunReport};
pub use error::{GatewayError, GatewayResult, ReconcileError, ReconcileResult};
pub use gateway::{AccountUpdate, BatchOutcome, DirectoryGateway, FailedItem};
pub use manager::{
    collect_requests, ManagerAssignment, ManagerPlan, ManagerRemoval, ManagerRequest,
    ManagerResolver,
};
pub use model::{
    identity_key, AccountRef, AttributeValue, DesiredRecord, DesiredState, ManagerRef,
    ObservedRecord,
};
pub use protection::{
    DeletionCandidate, ProtectedAccount, ProtectionOutcome, ProtectionPolicy, ProtectionRule,
};
pub use report::{render_plan, render_summary};
pub use summary::{Operation, OperationFailure, RunSummary};
