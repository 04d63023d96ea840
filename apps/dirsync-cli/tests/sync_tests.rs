//! End-to-end sync command runs against an in-memory directory.

use async_trait::async_trait;
use dirsync_cli::commands::sync::{run_sync, SyncArgs};
use dirsync_cli::config::SyncConfig;
use dirsync_cli::error::CliError;
use dirsync_graph::GraphGateway;
use dirsync_reconcile::{
    AccountRef, AccountUpdate, BatchOutcome, DesiredRecord, DirectoryGateway, GatewayResult,
    ObservedRecord, RunPhase,
};
use std::env::VarError;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

#[derive(Default)]
struct StubDirectory {
    accounts: Mutex<Vec<ObservedRecord>>,
    mutations: Mutex<Vec<String>>,
}

impl StubDirectory {
    fn with_accounts(accounts: Vec<ObservedRecord>) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(accounts),
            mutations: Mutex::new(Vec::new()),
        })
    }

    fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectoryGateway for StubDirectory {
    fn max_batch_size(&self) -> usize {
        20
    }

    async fn list_accounts(&self, _custom_fields: &[String]) -> GatewayResult<Vec<ObservedRecord>> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn create_many(
        &self,
        records: &[DesiredRecord],
    ) -> GatewayResult<BatchOutcome<DesiredRecord, AccountRef>> {
        let mut outcome = BatchOutcome::default();
        for (i, record) in records.iter().enumerate() {
            self.mutations
                .lock()
                .unwrap()
                .push(format!("create {}", record.email));
            outcome.add_success(AccountRef::new(format!("new-{i}"), record.email.clone()));
        }
        Ok(outcome)
    }

    async fn update_many(
        &self,
        updates: &[AccountUpdate],
    ) -> GatewayResult<BatchOutcome<AccountUpdate, AccountRef>> {
        let mut outcome = BatchOutcome::default();
        for update in updates {
            self.mutations
                .lock()
                .unwrap()
                .push(format!("update {}", update.email));
            outcome.add_success(AccountRef::new(update.user_id.clone(), update.email.clone()));
        }
        Ok(outcome)
    }

    async fn delete_many(
        &self,
        accounts: &[AccountRef],
    ) -> GatewayResult<BatchOutcome<AccountRef, AccountRef>> {
        let mut outcome = BatchOutcome::default();
        for account in accounts {
            self.mutations
                .lock()
                .unwrap()
                .push(format!("delete {}", account.email));
            outcome.add_success(account.clone());
        }
        Ok(outcome)
    }

    async fn get_by_email(&self, _email: &str) -> GatewayResult<Option<AccountRef>> {
        Ok(None)
    }

    async fn get_manager_of(&self, _user_id: &str) -> GatewayResult<Option<AccountRef>> {
        Ok(None)
    }

    async fn set_manager_ref(&self, user_id: &str, manager_id: &str) -> GatewayResult<()> {
        self.mutations
            .lock()
            .unwrap()
            .push(format!("manager {user_id} -> {manager_id}"));
        Ok(())
    }

    async fn clear_manager_ref(&self, user_id: &str) -> GatewayResult<()> {
        self.mutations
            .lock()
            .unwrap()
            .push(format!("clear manager {user_id}"));
        Ok(())
    }
}

fn config(extra: &[(&'static str, &'static str)]) -> SyncConfig {
    let extra = extra.to_vec();
    SyncConfig::from_reader(move |key| {
        if let Some((_, v)) = extra.iter().find(|(k, _)| *k == key) {
            return Ok((*v).to_string());
        }
        match key {
            "DIRSYNC_TENANT_ID" => Ok("tenant".into()),
            "DIRSYNC_ACCESS_TOKEN" => Ok("token".into()),
            "DIRSYNC_BATCH_DELAY_MS" => Ok("0".into()),
            _ => Err(VarError::NotPresent),
        }
    })
    .unwrap()
}

fn csv_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn args(file: &NamedTempFile) -> SyncArgs {
    SyncArgs {
        file: file.path().to_path_buf(),
        ..SyncArgs::default()
    }
}

fn existing() -> Vec<ObservedRecord> {
    vec![
        ObservedRecord::new("u1", "keep@x.com"),
        ObservedRecord::new("u2", "gone@x.com"),
    ]
}

#[tokio::test]
async fn test_dry_run_mutates_nothing() {
    let file = csv_file("email,displayName\nkeep@x.com,\nnew@x.com,New User\n");
    let directory = StubDirectory::with_accounts(existing());

    let report = run_sync(
        &SyncArgs {
            dry_run: true,
            ..args(&file)
        },
        &config(&[]),
        directory.clone(),
    )
    .await
    .unwrap();

    assert_eq!(report.phase, RunPhase::Reported);
    assert_eq!(report.delta.create.len(), 1);
    assert_eq!(report.delta.delete.len(), 1);
    assert!(directory.mutations().is_empty());
}

#[tokio::test]
async fn test_unconfirmed_deletes_stop_the_run() {
    let file = csv_file("email\nkeep@x.com\nnew@x.com\n");
    let directory = StubDirectory::with_accounts(existing());

    let report = run_sync(&args(&file), &config(&[]), directory.clone())
        .await
        .unwrap();

    assert_eq!(report.phase, RunPhase::AwaitingConfirmation);
    assert_eq!(report.exit_code(), 0);
    assert!(directory.mutations().is_empty());
}

#[tokio::test]
async fn test_forced_run_applies_create_and_delete() {
    let file = csv_file("email\nkeep@x.com\nnew@x.com\n");
    let directory = StubDirectory::with_accounts(existing());

    let report = run_sync(
        &SyncArgs {
            force: true,
            ..args(&file)
        },
        &config(&[]),
        directory.clone(),
    )
    .await
    .unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(
        directory.mutations(),
        vec!["create new@x.com", "delete gone@x.com"]
    );
}

#[tokio::test]
async fn test_skip_delete_applies_without_confirmation() {
    let file = csv_file("email\nkeep@x.com\nnew@x.com\n");
    let directory = StubDirectory::with_accounts(existing());

    let report = run_sync(
        &SyncArgs {
            skip_delete: true,
            ..args(&file)
        },
        &config(&[]),
        directory.clone(),
    )
    .await
    .unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    assert_eq!(directory.mutations(), vec!["create new@x.com"]);
}

#[tokio::test]
async fn test_protected_accounts_are_never_deleted() {
    let file = csv_file("email\nkeep@x.com\n");
    let directory = StubDirectory::with_accounts(existing());

    let report = run_sync(
        &SyncArgs {
            force: true,
            ..args(&file)
        },
        &config(&[("DIRSYNC_PROTECTED_EMAILS", "GONE@x.com")]),
        directory.clone(),
    )
    .await
    .unwrap();

    assert!(report.delta.delete.is_empty());
    assert_eq!(report.delta.protected.len(), 1);
    assert!(directory.mutations().is_empty());
}

#[tokio::test]
async fn test_duplicate_rows_are_a_validation_error() {
    let file = csv_file("email\na@x.com\nA@X.com\n");
    let directory = StubDirectory::with_accounts(vec![]);

    let err = run_sync(&args(&file), &config(&[]), directory.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, CliError::Validation(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(directory.mutations().is_empty());
}

#[tokio::test]
async fn test_custom_fields_without_extension_app_are_a_config_error() {
    let file = csv_file("email,costCenter\na@x.com,CC-1\n");
    // Nothing listens here; the run must fail before any request.
    let config = config(&[("DIRSYNC_GRAPH_URL", "http://127.0.0.1:9")]);
    let gateway = GraphGateway::new(config.credentials(), config.graph_config()).unwrap();

    let err = run_sync(&args(&file), &config, Arc::new(gateway))
        .await
        .unwrap_err();

    assert!(matches!(err, CliError::Config(ref m) if m.contains("costCenter")));
    assert_eq!(err.exit_code(), 2);
}
