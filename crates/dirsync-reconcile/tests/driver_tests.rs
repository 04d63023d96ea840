//! Reconciliation driver tests against an in-memory directory.

mod common;

use common::{fast_options, numbered_users, Call, MemoryGateway};
use std::sync::Arc;

use dirsync_reconcile::{
    AttributeValue, DesiredRecord, DesiredState, ManagerRef, ObservedRecord, Operation,
    ProtectionPolicy, ProtectionRule, ReconcileError, Reconciler, RunOptions, RunPhase,
};

fn reconciler(gateway: &Arc<MemoryGateway>, options: RunOptions) -> Reconciler {
    Reconciler::new(gateway.clone(), ProtectionPolicy::none(), options)
}

#[tokio::test]
async fn test_dry_run_reports_without_mutation() {
    let gateway = MemoryGateway::new()
        .with_account(ObservedRecord::new("1", "old@x.com"))
        .into_arc();
    let desired = DesiredState::new(vec![DesiredRecord::new("new@x.com")], vec![]);
    let options = RunOptions {
        dry_run: true,
        ..fast_options()
    };

    let report = reconciler(&gateway, options).run(&desired).await.unwrap();

    assert_eq!(report.phase, RunPhase::Reported);
    assert!(report.summary.is_none());
    assert_eq!(report.delta.create.len(), 1);
    assert_eq!(report.delta.delete.len(), 1);
    assert!(gateway.mutation_calls().is_empty());
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_pending_deletes_require_confirmation() {
    let gateway = MemoryGateway::new()
        .with_account(ObservedRecord::new("1", "old@x.com"))
        .into_arc();
    let desired = DesiredState::new(vec![DesiredRecord::new("new@x.com")], vec![]);

    let report = reconciler(&gateway, fast_options())
        .run(&desired)
        .await
        .unwrap();

    assert_eq!(report.phase, RunPhase::AwaitingConfirmation);
    assert!(gateway.mutation_calls().is_empty());
    assert!(gateway.account("old@x.com").is_some());
}

#[tokio::test]
async fn test_force_applies_deletes() {
    let gateway = MemoryGateway::new()
        .with_account(ObservedRecord::new("1", "old@x.com"))
        .into_arc();
    let desired = DesiredState::new(vec![DesiredRecord::new("new@x.com")], vec![]);
    let options = RunOptions {
        force: true,
        ..fast_options()
    };

    let report = reconciler(&gateway, options).run(&desired).await.unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.deleted, 1);
    assert!(gateway.account("old@x.com").is_none());
    assert!(gateway.account("new@x.com").is_some());
}

#[tokio::test]
async fn test_skip_delete_bypasses_gate_and_keeps_accounts() {
    let gateway = MemoryGateway::new()
        .with_account(ObservedRecord::new("1", "old@x.com"))
        .into_arc();
    let desired = DesiredState::new(vec![DesiredRecord::new("new@x.com")], vec![]);
    let options = RunOptions {
        skip_delete: true,
        ..fast_options()
    };

    let report = reconciler(&gateway, options).run(&desired).await.unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.skipped, 1);
    assert!(gateway.account("old@x.com").is_some());
}

#[tokio::test]
async fn test_skip_create_and_update() {
    let gateway = MemoryGateway::new()
        .with_account(
            ObservedRecord::new("1", "a@x.com")
                .with_attribute("jobTitle", AttributeValue::scalar("Dev")),
        )
        .into_arc();
    let desired = DesiredState::new(
        vec![
            DesiredRecord::new("a@x.com").with_attribute("jobTitle", AttributeValue::scalar("Lead")),
            DesiredRecord::new("b@x.com"),
        ],
        vec![],
    );
    let options = RunOptions {
        skip_create: true,
        skip_update: true,
        ..fast_options()
    };

    let report = reconciler(&gateway, options).run(&desired).await.unwrap();

    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.skipped, 2);
    assert!(gateway.mutation_calls().is_empty());
}

#[tokio::test]
async fn test_duplicate_desired_keys_abort_before_remote_calls() {
    let gateway = MemoryGateway::new().into_arc();
    let desired = DesiredState::new(
        vec![DesiredRecord::new("a@x.com"), DesiredRecord::new("A@x.com")],
        vec![],
    );

    let err = reconciler(&gateway, fast_options())
        .run(&desired)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::DuplicateKey { .. }));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_create_batches_are_bounded_and_isolated() {
    let gateway = MemoryGateway::with_batch_limit(20)
        .failing_item("user07@x.com")
        .into_arc();
    let desired = DesiredState::new(numbered_users(25), vec![]);

    let report = reconciler(&gateway, fast_options())
        .run(&desired)
        .await
        .unwrap();

    assert_eq!(gateway.create_batch_sizes(), vec![20, 5]);
    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.created, 24);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].operation, Operation::Create);
    assert_eq!(summary.failures[0].email, "user07@x.com");
    assert_eq!(gateway.account_count(), 24);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_configured_batch_size_below_gateway_limit() {
    let gateway = MemoryGateway::with_batch_limit(20).into_arc();
    let desired = DesiredState::new(numbered_users(7), vec![]);
    let options = RunOptions {
        batch_size: 3,
        ..fast_options()
    };

    reconciler(&gateway, options).run(&desired).await.unwrap();

    assert_eq!(gateway.create_batch_sizes(), vec![3, 3, 1]);
}

#[tokio::test]
async fn test_rejected_batch_marks_items_failed_and_continues() {
    let gateway = MemoryGateway::with_batch_limit(20)
        .rejecting_create_batch(1)
        .into_arc();
    let desired = DesiredState::new(numbered_users(25), vec![]);

    let report = reconciler(&gateway, fast_options())
        .run(&desired)
        .await
        .unwrap();

    assert_eq!(gateway.create_batch_sizes(), vec![20, 5]);
    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.created, 5);
    assert_eq!(summary.failures.len(), 20);
    assert!(summary.failures.iter().all(|f| f.error.contains("batch rejected")));
}

#[tokio::test]
async fn test_updates_apply_changed_fields() {
    let gateway = MemoryGateway::new()
        .with_account(
            ObservedRecord::new("1", "a@x.com")
                .with_attribute("department", AttributeValue::scalar("Sales"))
                .with_custom("costCenter", "7"),
        )
        .into_arc();
    let desired = DesiredState::new(
        vec![DesiredRecord::new("a@x.com")
            .with_attribute("department", AttributeValue::scalar("Eng"))
            .with_custom("costCenter", "42")],
        vec!["costCenter".to_string()],
    );

    let report = reconciler(&gateway, fast_options())
        .run(&desired)
        .await
        .unwrap();

    assert_eq!(report.summary.unwrap().updated, 1);
    let account = gateway.account("a@x.com").unwrap();
    assert_eq!(
        account.attributes.get("department"),
        Some(&AttributeValue::scalar("Eng"))
    );
    assert_eq!(account.custom.get("costCenter").map(String::as_str), Some("42"));
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let gateway = MemoryGateway::new().into_arc();
    let desired = DesiredState::new(
        vec![
            DesiredRecord::new("m@x.com"),
            DesiredRecord::new("a@x.com")
                .with_attribute("department", AttributeValue::scalar("Eng"))
                .with_manager(ManagerRef::Set("m@x.com".into())),
        ],
        vec![],
    );

    let first = reconciler(&gateway, fast_options())
        .run(&desired)
        .await
        .unwrap();
    assert_eq!(first.summary.unwrap().created, 2);

    let second = reconciler(&gateway, fast_options())
        .run(&desired)
        .await
        .unwrap();
    assert!(second.delta.is_empty());
    assert_eq!(second.summary.unwrap().unchanged, 2);
}

#[tokio::test]
async fn test_phases_run_in_fixed_order() {
    let gateway = MemoryGateway::new()
        .with_account(
            ObservedRecord::new("1", "a@x.com")
                .with_attribute("jobTitle", AttributeValue::scalar("Dev")),
        )
        .with_account(ObservedRecord::new("2", "gone@x.com"))
        .into_arc();
    let desired = DesiredState::new(
        vec![
            DesiredRecord::new("a@x.com").with_attribute("jobTitle", AttributeValue::scalar("Lead")),
            DesiredRecord::new("n@x.com").with_manager(ManagerRef::Set("a@x.com".into())),
        ],
        vec![],
    );
    let options = RunOptions {
        force: true,
        ..fast_options()
    };

    reconciler(&gateway, options).run(&desired).await.unwrap();

    let order: Vec<&str> = gateway
        .mutation_calls()
        .iter()
        .map(|c| match c {
            Call::Create(_) => "create",
            Call::Update(_) => "update",
            Call::SetManager { .. } => "manager",
            Call::ClearManager(_) => "manager",
            Call::Delete(_) => "delete",
            _ => "other",
        })
        .collect();
    assert_eq!(order, vec!["create", "update", "manager", "delete"]);
}

#[tokio::test]
async fn test_protected_accounts_survive_forced_run() {
    let gateway = MemoryGateway::new()
        .with_account(ObservedRecord::new("1", "admin@x.com").with_role("Global Administrator"))
        .with_account(ObservedRecord::new("2", "b@x.com"))
        .into_arc();
    let policy = ProtectionPolicy::new(vec![ProtectionRule::Role("Global Administrator".into())]);
    let options = RunOptions {
        force: true,
        ..fast_options()
    };

    let report = Reconciler::new(gateway.clone(), policy, options)
        .run(&DesiredState::default())
        .await
        .unwrap();

    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.protected, 1);
    assert!(gateway.account("admin@x.com").is_some());
    assert!(gateway.account("b@x.com").is_none());
}

#[tokio::test]
async fn test_item_failure_does_not_stop_later_phases() {
    let gateway = MemoryGateway::new()
        .with_account(ObservedRecord::new("1", "gone@x.com"))
        .failing_item("new@x.com")
        .into_arc();
    let desired = DesiredState::new(vec![DesiredRecord::new("new@x.com")], vec![]);
    let options = RunOptions {
        force: true,
        ..fast_options()
    };

    let report = reconciler(&gateway, options).run(&desired).await.unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.created, 0);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.exit_code(), 1);
}
