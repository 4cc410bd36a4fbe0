// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloud API collaborator consumed by the coordination core.
//!
//! The core never talks HTTP itself. It receives an implementation of
//! [`FirewallApi`] at construction:
//!
//! - [`crate::hcloud::HcloudClient`] - the Hetzner Cloud HTTP API
//! - [`memory::InMemoryFirewallApi`] - an in-process backend with fault
//!   injection, used by tests and local simulation

pub mod memory;

use crate::errors::{FirewallError, Result};
use crate::model::{Action, ActionId, Firewall, FirewallId, FirewallRule, ServerId};
use crate::retry::cancellable;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Parameters of a firewall creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateFirewallRequest {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub rules: Vec<FirewallRule>,
}

/// Result of a firewall creation.
#[derive(Debug, Clone)]
pub struct CreatedFirewall {
    pub firewall: Firewall,
    /// Actions triggered by the creation (e.g. applying to resources)
    pub actions: Vec<Action>,
}

/// Firewall operations of the cloud API.
///
/// Mutating calls return the asynchronous actions they triggered; callers
/// pass those to [`FirewallApi::wait_for_action`] before observing the result.
#[async_trait]
pub trait FirewallApi: Send + Sync {
    /// List every firewall matching a label selector (all pages).
    async fn list_firewalls(&self, label_selector: &str) -> Result<Vec<Firewall>>;

    /// Fetch a firewall by id; `Ok(None)` if it does not exist.
    async fn get_firewall(&self, id: FirewallId) -> Result<Option<Firewall>>;

    /// Create a firewall.
    async fn create_firewall(&self, request: &CreateFirewallRequest) -> Result<CreatedFirewall>;

    /// Replace the complete rule list of a firewall.
    async fn set_rules(&self, id: FirewallId, rules: &[FirewallRule]) -> Result<Vec<Action>>;

    /// Attach a firewall to a server.
    async fn apply_to_server(&self, id: FirewallId, server_id: ServerId) -> Result<Vec<Action>>;

    /// Delete a firewall. Fails with `resource_in_use` while it is attached.
    async fn delete_firewall(&self, id: FirewallId) -> Result<()>;

    /// Block until `action` reaches a terminal status, surfacing its error.
    async fn wait_for_action(&self, action: &Action) -> Result<()>;
}

/// Wait for all `actions` concurrently and return the ones that failed.
///
/// # Errors
///
/// Returns [`FirewallError::Cancelled`] if `cancel` fires while waiting.
pub async fn wait_for_actions(
    api: &dyn FirewallApi,
    actions: &[Action],
    cancel: &CancellationToken,
) -> Result<Vec<(ActionId, FirewallError)>> {
    let waits = actions
        .iter()
        .map(|action| async move { (action.id, api.wait_for_action(action).await) });
    let results = cancellable(cancel, async { Ok(join_all(waits).await) }).await?;
    Ok(results
        .into_iter()
        .filter_map(|(id, result)| result.err().map(|err| (id, err)))
        .collect())
}
