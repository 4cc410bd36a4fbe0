// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node join and leave paths of the shared firewall.
//!
//! [`NodeFirewall`] strings the firewall components together the way a node's
//! provisioning uses them:
//!
//! - **join** (after the server is running): a managing node finds or creates
//!   the shared firewall, attaches it to its server and adds its public
//!   address. A failure undoes what was done for this node and is returned.
//!   A non-managing node of a cluster only registers its address, if the
//!   cluster has a shared firewall; failing to do so is logged, not returned.
//! - **leave** (before the server is deleted): the node's address is removed.
//! - **reap** (after the server is deleted): the owning node deletes the
//!   firewall if nothing is attached to it anymore.
//!
//! Leave and reap are best-effort and never fail, so a node can always be
//! removed. What join returns ([`NodeFirewallState`]) is persisted with the
//! node so the later paths do not need to rediscover the firewall.

use crate::api::FirewallApi;
use crate::config::NodeFirewallConfig;
use crate::coordinator::NodeIpCoordinator;
use crate::errors::Result;
use crate::firewall::{
    attach_to_server, delete_if_orphaned, find, find_or_create, ProvisionRequest, ReapOutcome,
};
use crate::model::{FirewallId, NodeAddress, ServerId};
use crate::retry::RetryScheduler;
use crate::rules::has_address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Firewall facts of a node, persisted alongside the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFirewallState {
    /// Shared firewall the node's address was registered with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall_id: Option<FirewallId>,
    /// Public IPv4 address registered in the firewall
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ipv4: Option<String>,
    /// The node manages the firewall and may delete it
    #[serde(default)]
    pub owns_firewall: bool,
}

/// Shared firewall operations of one node.
pub struct NodeFirewall {
    api: Arc<dyn FirewallApi>,
    config: NodeFirewallConfig,
    coordinator: NodeIpCoordinator,
}

impl NodeFirewall {
    /// `config` is expected to have passed [`NodeFirewallConfig::validated`].
    #[must_use]
    pub fn new(
        api: Arc<dyn FirewallApi>,
        config: NodeFirewallConfig,
        scheduler: Arc<RetryScheduler>,
    ) -> Self {
        let coordinator = NodeIpCoordinator::new(api.clone(), scheduler);
        Self {
            api,
            config,
            coordinator,
        }
    }

    /// Set the maximum number of addresses an internal rule may hold.
    #[must_use]
    pub fn with_max_rule_addresses(mut self, limit: usize) -> Self {
        self.coordinator = self.coordinator.with_max_rule_addresses(limit);
        self
    }

    #[must_use]
    pub fn config(&self) -> &NodeFirewallConfig {
        &self.config
    }

    /// Set up the shared firewall for a node whose server is running.
    ///
    /// `public_ipv4` is ignored when the node has public IPv4 disabled.
    ///
    /// # Errors
    ///
    /// Only a managing node fails. Anything created for the node is cleaned up
    /// before the error is returned.
    pub async fn join(
        &self,
        server_id: ServerId,
        public_ipv4: Option<NodeAddress>,
        cancel: &CancellationToken,
    ) -> Result<NodeFirewallState> {
        let address = public_ipv4.filter(|_| !self.config.disable_public_ipv4);
        let mut state = NodeFirewallState {
            public_ipv4: address.map(|a| a.ip().to_string()),
            ..NodeFirewallState::default()
        };

        if self.config.manage_firewall {
            state.firewall_id = Some(self.set_up(server_id, address, cancel).await?);
            state.owns_firewall = true;
        } else if let Some(address) = address.filter(|_| !self.config.cluster_id.is_empty()) {
            state.firewall_id = self.register(address, cancel).await;
        }
        Ok(state)
    }

    async fn set_up(
        &self,
        server_id: ServerId,
        address: Option<NodeAddress>,
        cancel: &CancellationToken,
    ) -> Result<FirewallId> {
        let request = ProvisionRequest {
            cluster_id: self.config.cluster_id.clone(),
            name: self.config.firewall_name.clone(),
            initial_address: address,
            populate_rules: self.config.populate_rules,
        };
        let provisioned = find_or_create(self.api.as_ref(), &request, cancel)
            .await
            .inspect_err(|e| error!("Failed to set up shared firewall: {}", e))?;
        let firewall = provisioned.firewall;

        if let Err(err) = attach_to_server(self.api.as_ref(), &firewall, server_id, cancel).await {
            error!("Failed to attach firewall {}: {}", firewall.id, err);
            delete_if_orphaned(self.api.as_ref(), firewall.id, cancel).await;
            return Err(err);
        }

        let Some(address) = address else {
            return Ok(firewall.id);
        };
        // A firewall created with populated rules already lists the creator
        if provisioned.created && has_address(&firewall.rules, address) {
            return Ok(firewall.id);
        }

        if let Err(err) = self.coordinator.add(firewall.id, address, cancel).await {
            if let Err(cleanup) = self.coordinator.remove(firewall.id, address, cancel).await {
                warn!(
                    "Failed to remove node address {} after a failed join: {}",
                    address, cleanup
                );
            }
            delete_if_orphaned(self.api.as_ref(), firewall.id, cancel).await;
            return Err(err);
        }
        Ok(firewall.id)
    }

    /// Add the address of a node that does not manage the firewall.
    async fn register(
        &self,
        address: NodeAddress,
        cancel: &CancellationToken,
    ) -> Option<FirewallId> {
        let firewall = match find(self.api.as_ref(), &self.config.cluster_id, cancel).await {
            Ok(Some(firewall)) => firewall,
            Ok(None) => {
                info!(
                    "No shared firewall found for cluster {:?}, skipping address registration",
                    self.config.cluster_id
                );
                return None;
            }
            Err(err) => {
                warn!("Could not register with cluster firewall: {}", err);
                return None;
            }
        };

        info!(
            "Found cluster firewall {:?} (ID={}), adding node address {}",
            firewall.name, firewall.id, address
        );
        if let Err(err) = self.coordinator.add(firewall.id, address, cancel).await {
            warn!("Could not register with cluster firewall: {}", err);
        }
        Some(firewall.id)
    }

    /// Remove the node's address from the shared firewall. Never fails.
    pub async fn leave(&self, state: &NodeFirewallState, cancel: &CancellationToken) {
        let (Some(firewall_id), Some(ip)) = (state.firewall_id, state.public_ipv4.as_deref())
        else {
            return;
        };
        let address: NodeAddress = match ip.parse() {
            Ok(address) => address,
            Err(err) => {
                warn!("Skipping firewall cleanup: {}", err);
                return;
            }
        };
        if let Err(err) = self.coordinator.remove(firewall_id, address, cancel).await {
            warn!(
                "Failed to remove node address {} from firewall {}: {}",
                address, firewall_id, err
            );
        }
    }

    /// Delete the shared firewall if this node owns it and nothing is attached
    /// to it. Returns `None` if the node does not own a firewall.
    pub async fn reap(
        &self,
        state: &NodeFirewallState,
        cancel: &CancellationToken,
    ) -> Option<ReapOutcome> {
        if !state.owns_firewall {
            return None;
        }
        let firewall_id = state.firewall_id?;
        Some(delete_if_orphaned(self.api.as_ref(), firewall_id, cancel).await)
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod lifecycle_tests;
