//! Common test utilities for dirsync-reconcile integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dirsync_reconcile::{
    identity_key, AccountRef, AccountUpdate, BatchOutcome, DesiredRecord, DirectoryGateway,
    GatewayError, GatewayResult, ObservedRecord, RunOptions,
};

/// A recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create(Vec<String>),
    Update(Vec<String>),
    Delete(Vec<String>),
    GetByEmail(String),
    GetManagerOf(String),
    SetManager { user_id: String, manager_id: String },
    ClearManager(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Create(_)
                | Call::Update(_)
                | Call::Delete(_)
                | Call::SetManager { .. }
                | Call::ClearManager(_)
        )
    }
}

#[derive(Debug, Default)]
struct State {
    accounts: BTreeMap<String, ObservedRecord>,
    next_id: usize,
    calls: Vec<Call>,
    failing_items: HashSet<String>,
    rejected_create_batches: HashSet<usize>,
    create_batches: usize,
    failing_lookups: HashSet<String>,
    failing_manager_users: HashSet<String>,
}

/// In-memory directory that records every call and can inject failures.
pub struct MemoryGateway {
    max_batch: usize,
    state: Mutex<State>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::with_batch_limit(20)
    }

    pub fn with_batch_limit(max_batch: usize) -> Self {
        Self {
            max_batch,
            state: Mutex::new(State::default()),
        }
    }

    /// Seeds an existing account.
    pub fn with_account(self, record: ObservedRecord) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.accounts.insert(record.id.clone(), record);
        }
        self
    }

    /// Makes create/update/delete of this email fail at item level.
    pub fn failing_item(self, email: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_items
            .insert(identity_key(email));
        self
    }

    /// Rejects the n-th create batch (1-based) as a whole.
    pub fn rejecting_create_batch(self, n: usize) -> Self {
        self.state.lock().unwrap().rejected_create_batches.insert(n);
        self
    }

    /// Makes `get_by_email` for this email return a transport error.
    pub fn failing_lookup(self, email: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_lookups
            .insert(identity_key(email));
        self
    }

    /// Makes manager assignment/removal for this email fail.
    pub fn failing_manager_update(self, email: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_manager_users
            .insert(identity_key(email));
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn create_batch_sizes(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(emails) => Some(emails.len()),
                _ => None,
            })
            .collect()
    }

    pub fn account(&self, email: &str) -> Option<ObservedRecord> {
        let key = identity_key(email);
        self.state
            .lock()
            .unwrap()
            .accounts
            .values()
            .find(|a| a.key() == key)
            .cloned()
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().unwrap().accounts.len()
    }
}

fn find_id(state: &State, email: &str) -> Option<String> {
    let key = identity_key(email);
    state
        .accounts
        .values()
        .find(|a| a.key() == key)
        .map(|a| a.id.clone())
}

#[async_trait]
impl DirectoryGateway for MemoryGateway {
    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    async fn list_accounts(&self, _custom_fields: &[String]) -> GatewayResult<Vec<ObservedRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List);
        Ok(state
            .accounts
            .values()
            .cloned()
            .map(|mut a| {
                a.manager_email = None;
                a
            })
            .collect())
    }

    async fn create_many(
        &self,
        records: &[DesiredRecord],
    ) -> GatewayResult<BatchOutcome<DesiredRecord, AccountRef>> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::Create(records.iter().map(|r| r.key()).collect()));
        state.create_batches += 1;
        if state.rejected_create_batches.contains(&state.create_batches) {
            return Err(GatewayError::Transport("batch rejected".into()));
        }

        let mut outcome = BatchOutcome::default();
        for record in records {
            if state.failing_items.contains(&record.key()) {
                outcome.add_failure(record.clone(), "create refused");
                continue;
            }
            state.next_id += 1;
            let id = format!("new-{}", state.next_id);
            let mut account = ObservedRecord::new(id.clone(), record.email.clone());
            account.attributes = record.attributes.clone();
            account.custom = record.custom.clone();
            account.display_name = record.display_name();
            state.accounts.insert(id.clone(), account);
            outcome.add_success(AccountRef::new(id, record.email.clone()));
        }
        Ok(outcome)
    }

    async fn update_many(
        &self,
        updates: &[AccountUpdate],
    ) -> GatewayResult<BatchOutcome<AccountUpdate, AccountRef>> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::Update(updates.iter().map(|u| identity_key(&u.email)).collect()));

        let mut outcome = BatchOutcome::default();
        for update in updates {
            if state.failing_items.contains(&identity_key(&update.email)) {
                outcome.add_failure(update.clone(), "update refused");
                continue;
            }
            let Some(account) = state.accounts.get_mut(&update.user_id) else {
                outcome.add_failure(update.clone(), "no such account");
                continue;
            };
            for (field, value) in &update.attributes {
                match value {
                    Some(v) => {
                        account.attributes.insert(field.clone(), v.clone());
                    }
                    None => {
                        account.attributes.remove(field);
                    }
                }
            }
            for (field, value) in &update.custom {
                match value {
                    Some(v) => {
                        account.custom.insert(field.clone(), v.clone());
                    }
                    None => {
                        account.custom.remove(field);
                    }
                }
            }
            outcome.add_success(AccountRef::new(update.user_id.clone(), update.email.clone()));
        }
        Ok(outcome)
    }

    async fn delete_many(
        &self,
        accounts: &[AccountRef],
    ) -> GatewayResult<BatchOutcome<AccountRef, AccountRef>> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::Delete(accounts.iter().map(|a| identity_key(&a.email)).collect()));

        let mut outcome = BatchOutcome::default();
        for account in accounts {
            if state.failing_items.contains(&identity_key(&account.email)) {
                outcome.add_failure(account.clone(), "delete refused");
                continue;
            }
            if state.accounts.remove(&account.id).is_some() {
                outcome.add_success(account.clone());
            } else {
                outcome.add_failure(account.clone(), "no such account");
            }
        }
        Ok(outcome)
    }

    async fn get_by_email(&self, email: &str) -> GatewayResult<Option<AccountRef>> {
        let mut state = self.state.lock().unwrap();
        let key = identity_key(email);
        state.calls.push(Call::GetByEmail(key.clone()));
        if state.failing_lookups.contains(&key) {
            return Err(GatewayError::Transport("lookup timed out".into()));
        }
        Ok(find_id(&state, email).map(|id| AccountRef::new(id, key)))
    }

    async fn get_manager_of(&self, user_id: &str) -> GatewayResult<Option<AccountRef>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetManagerOf(user_id.to_string()));
        let manager_id = state
            .accounts
            .get(user_id)
            .and_then(|a| a.manager_id.clone());
        Ok(manager_id.and_then(|id| {
            state
                .accounts
                .get(&id)
                .map(|m| AccountRef::new(m.id.clone(), m.email.clone()))
        }))
    }

    async fn set_manager_ref(&self, user_id: &str, manager_id: &str) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetManager {
            user_id: user_id.to_string(),
            manager_id: manager_id.to_string(),
        });
        if !state.accounts.contains_key(manager_id) {
            return Err(GatewayError::NotFound(manager_id.to_string()));
        }
        let failing = state
            .accounts
            .get(user_id)
            .is_some_and(|a| state.failing_manager_users.contains(&a.key()));
        if failing {
            return Err(GatewayError::Remote("manager update refused".into()));
        }
        let account = state
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| GatewayError::NotFound(user_id.to_string()))?;
        account.manager_id = Some(manager_id.to_string());
        account.manager_email = None;
        Ok(())
    }

    async fn clear_manager_ref(&self, user_id: &str) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ClearManager(user_id.to_string()));
        let account = state
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| GatewayError::NotFound(user_id.to_string()))?;
        account.manager_id = None;
        account.manager_email = None;
        Ok(())
    }
}

/// Run options without pacing delay.
pub fn fast_options() -> RunOptions {
    RunOptions {
        batch_delay: Duration::ZERO,
        ..RunOptions::default()
    }
}

/// Numbered desired records `user01@x.com` .. `userNN@x.com`.
pub fn numbered_users(count: usize) -> Vec<DesiredRecord> {
    (1..=count)
        .map(|n| DesiredRecord::new(format!("user{n:02}@x.com")))
        .collect()
}
