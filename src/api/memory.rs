// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process [`FirewallApi`] backend.
//!
//! Behaves like the Hetzner firewall endpoints closely enough to exercise the
//! coordination protocol: names are unique, a firewall attached to a server
//! cannot be deleted, and attaching twice fails with `firewall_already_applied`.
//!
//! Faults can be injected to reproduce the situations the protocol has to
//! survive:
//!
//! - [`InMemoryFirewallApi::lose_next_updates`] acknowledges rule replacements
//!   without applying them, as if another writer overwrote them immediately
//! - [`InMemoryFirewallApi::fail_next`] queues an API error for a call kind
//! - [`InMemoryFirewallApi::race_next_create`] lets a competing node win the
//!   next creation
//! - [`InMemoryFirewallApi::fail_next_actions`] makes triggered actions end in
//!   `error`
//!
//! Every call can optionally yield to the scheduler first, so concurrent
//! callers interleave between their remote calls.

use super::{CreateFirewallRequest, CreatedFirewall, FirewallApi};
use crate::errors::{ApiError, ErrorCode, FirewallError, Result};
use crate::model::{
    Action, ActionError, ActionStatus, AppliedResource, Firewall, FirewallId, FirewallRule,
    ServerId,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Kind of API call, used to target injected failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCall {
    List,
    Get,
    Create,
    SetRules,
    ApplyToServer,
    Delete,
}

/// Number of calls received per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub get: usize,
    pub create: usize,
    pub set_rules: usize,
    pub apply_to_server: usize,
    pub delete: usize,
}

impl CallCounts {
    fn bump(&mut self, call: ApiCall) {
        let slot = match call {
            ApiCall::List => &mut self.list,
            ApiCall::Get => &mut self.get,
            ApiCall::Create => &mut self.create,
            ApiCall::SetRules => &mut self.set_rules,
            ApiCall::ApplyToServer => &mut self.apply_to_server,
            ApiCall::Delete => &mut self.delete,
        };
        *slot += 1;
    }
}

#[derive(Debug, Default)]
struct State {
    next_firewall_id: FirewallId,
    next_action_id: u64,
    firewalls: BTreeMap<FirewallId, Firewall>,
    failures: HashMap<ApiCall, VecDeque<ApiError>>,
    lost_updates: u32,
    failed_actions: u32,
    race_next_create: bool,
    calls: CallCounts,
}

impl State {
    /// Count the call and pop an injected failure, if any.
    fn enter(&mut self, call: ApiCall) -> Result<()> {
        self.calls.bump(call);
        match self.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            Some(err) => Err(FirewallError::Api(err)),
            None => Ok(()),
        }
    }

    fn action(&mut self, command: &str) -> Action {
        self.next_action_id += 1;
        let now = Utc::now();
        let error = if self.failed_actions > 0 {
            self.failed_actions -= 1;
            Some(ActionError {
                code: ErrorCode::ServerError,
                message: format!("{command} failed"),
            })
        } else {
            None
        };
        Action {
            id: self.next_action_id,
            command: command.to_string(),
            status: if error.is_some() {
                ActionStatus::Error
            } else {
                ActionStatus::Success
            },
            progress: 100,
            started: Some(now),
            finished: Some(now),
            error,
        }
    }

    fn insert(&mut self, request: &CreateFirewallRequest) -> Firewall {
        self.next_firewall_id += 1;
        let firewall = Firewall {
            id: self.next_firewall_id,
            name: request.name.clone(),
            labels: request.labels.clone(),
            rules: request.rules.clone(),
            applied_to: Vec::new(),
            created: Some(Utc::now()),
        };
        self.firewalls.insert(firewall.id, firewall.clone());
        firewall
    }

    fn get_mut(&mut self, id: FirewallId) -> Result<&mut Firewall> {
        self.firewalls.get_mut(&id).ok_or_else(|| {
            FirewallError::Api(ApiError::new(
                ErrorCode::NotFound,
                format!("firewall with ID '{id}' not found"),
            ))
        })
    }
}

/// Does a `k=v,k2=v2` selector (bare `k` means "key present") match `labels`?
fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}

/// Shared in-memory firewall store implementing [`FirewallApi`].
#[derive(Debug, Default)]
pub struct InMemoryFirewallApi {
    state: Mutex<State>,
    yield_between_calls: AtomicBool,
}

impl InMemoryFirewallApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn checkpoint(&self) {
        if self.yield_between_calls.load(Ordering::Relaxed) {
            tokio::task::yield_now().await;
        }
    }

    /// Yield to the scheduler at the start of every call.
    pub fn set_yield_between_calls(&self, enabled: bool) {
        self.yield_between_calls.store(enabled, Ordering::Relaxed);
    }

    /// Store a firewall directly, bypassing name uniqueness. Returns its id.
    pub fn insert_firewall(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        rules: Vec<FirewallRule>,
    ) -> FirewallId {
        self.state()
            .insert(&CreateFirewallRequest {
                name: name.to_string(),
                labels,
                rules,
            })
            .id
    }

    /// Snapshot of a stored firewall.
    #[must_use]
    pub fn firewall(&self, id: FirewallId) -> Option<Firewall> {
        self.state().firewalls.get(&id).cloned()
    }

    /// Snapshot of every stored firewall.
    #[must_use]
    pub fn firewalls(&self) -> Vec<Firewall> {
        self.state().firewalls.values().cloned().collect()
    }

    /// Overwrite the rules of a stored firewall, as another writer would.
    pub fn replace_rules(&self, id: FirewallId, rules: Vec<FirewallRule>) {
        if let Some(firewall) = self.state().firewalls.get_mut(&id) {
            firewall.rules = rules;
        }
    }

    /// Attach a firewall to a server outside of the API (e.g. via the console).
    pub fn attach_server(&self, id: FirewallId, server_id: ServerId) {
        if let Some(firewall) = self.state().firewalls.get_mut(&id) {
            let resource = AppliedResource::server(server_id);
            if !firewall.applied_to.contains(&resource) {
                firewall.applied_to.push(resource);
            }
        }
    }

    /// Detach a firewall from a server, as happens when the server is deleted.
    pub fn detach_server(&self, id: FirewallId, server_id: ServerId) {
        if let Some(firewall) = self.state().firewalls.get_mut(&id) {
            let resource = AppliedResource::server(server_id);
            firewall.applied_to.retain(|r| *r != resource);
        }
    }

    /// Acknowledge the next `count` rule replacements without applying them.
    pub fn lose_next_updates(&self, count: u32) {
        self.state().lost_updates += count;
    }

    /// Fail the next call of kind `call` with `error`. Errors queue up.
    pub fn fail_next(&self, call: ApiCall, error: ApiError) {
        self.state()
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    /// Let a competing node create the requested firewall first; the next
    /// creation stores it and then fails with `uniqueness_error`.
    pub fn race_next_create(&self) {
        self.state().race_next_create = true;
    }

    /// Make the next `count` triggered actions finish with status `error`.
    pub fn fail_next_actions(&self, count: u32) {
        self.state().failed_actions += count;
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }
}

#[async_trait]
impl FirewallApi for InMemoryFirewallApi {
    async fn list_firewalls(&self, label_selector: &str) -> Result<Vec<Firewall>> {
        self.checkpoint().await;
        let mut state = self.state();
        state.enter(ApiCall::List)?;
        Ok(state
            .firewalls
            .values()
            .filter(|fw| matches_selector(&fw.labels, label_selector))
            .cloned()
            .collect())
    }

    async fn get_firewall(&self, id: FirewallId) -> Result<Option<Firewall>> {
        self.checkpoint().await;
        let mut state = self.state();
        state.enter(ApiCall::Get)?;
        Ok(state.firewalls.get(&id).cloned())
    }

    async fn create_firewall(&self, request: &CreateFirewallRequest) -> Result<CreatedFirewall> {
        self.checkpoint().await;
        let mut state = self.state();
        state.enter(ApiCall::Create)?;

        if std::mem::take(&mut state.race_next_create) {
            let winner = state.insert(request);
            debug!(firewall_id = winner.id, "competing node created the firewall first");
        }
        if state.firewalls.values().any(|fw| fw.name == request.name) {
            return Err(ApiError::new(
                ErrorCode::UniquenessError,
                format!("firewall name '{}' is already used", request.name),
            )
            .into());
        }

        let firewall = state.insert(request);
        let actions = if firewall.rules.is_empty() {
            Vec::new()
        } else {
            vec![state.action("set_firewall_rules")]
        };
        Ok(CreatedFirewall { firewall, actions })
    }

    async fn set_rules(&self, id: FirewallId, rules: &[FirewallRule]) -> Result<Vec<Action>> {
        self.checkpoint().await;
        let mut state = self.state();
        state.enter(ApiCall::SetRules)?;

        if state.lost_updates > 0 {
            state.lost_updates -= 1;
            state.get_mut(id)?;
            debug!(firewall_id = id, "dropping rule update");
        } else {
            state.get_mut(id)?.rules = rules.to_vec();
        }
        Ok(vec![state.action("set_firewall_rules")])
    }

    async fn apply_to_server(&self, id: FirewallId, server_id: ServerId) -> Result<Vec<Action>> {
        self.checkpoint().await;
        let mut state = self.state();
        state.enter(ApiCall::ApplyToServer)?;

        let resource = AppliedResource::server(server_id);
        let firewall = state.get_mut(id)?;
        if firewall.applied_to.contains(&resource) {
            return Err(ApiError::new(
                ErrorCode::FirewallAlreadyApplied,
                format!("firewall {id} is already applied to server {server_id}"),
            )
            .into());
        }
        firewall.applied_to.push(resource);
        Ok(vec![state.action("apply_firewall")])
    }

    async fn delete_firewall(&self, id: FirewallId) -> Result<()> {
        self.checkpoint().await;
        let mut state = self.state();
        state.enter(ApiCall::Delete)?;

        if !state.get_mut(id)?.applied_to.is_empty() {
            return Err(ApiError::new(
                ErrorCode::ResourceInUse,
                format!("firewall {id} is still in use"),
            )
            .into());
        }
        state.firewalls.remove(&id);
        Ok(())
    }

    async fn wait_for_action(&self, action: &Action) -> Result<()> {
        self.checkpoint().await;
        match &action.error {
            Some(err) => Err(ApiError::new(err.code, err.message.clone()).into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
