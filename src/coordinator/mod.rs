// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node address membership of a shared firewall.
//!
//! Every node of a cluster adds its own public address to the internal rules
//! of the shared firewall when it joins, and removes it when it leaves. Nodes
//! run in separate processes with nothing in common but the firewall itself,
//! and the API only offers a full replacement of the rule list, so two nodes
//! updating at the same time can silently overwrite each other.
//!
//! [`NodeIpCoordinator`] therefore never assumes a write succeeded: after each
//! replacement it re-reads the firewall and retries (with jittered backoff)
//! until its own address is observed present (or absent). See [`cas::converge`].
//!
//! Convergence is per call: once `add` has observed its address, a later
//! overwrite by a slower writer can still drop it. Callers needing stronger
//! guarantees re-run `add`, which is idempotent.
//!
//! # Example
//!
//! ```rust,no_run
//! use clusterfw::api::memory::InMemoryFirewallApi;
//! use clusterfw::coordinator::NodeIpCoordinator;
//! use clusterfw::retry::RetryScheduler;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> clusterfw::errors::Result<()> {
//! let api = Arc::new(InMemoryFirewallApi::new());
//! let coordinator = NodeIpCoordinator::new(api, Arc::new(RetryScheduler::default()));
//! coordinator
//!     .add(42, "10.0.0.1".parse()?, &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cas;

use crate::api::{wait_for_actions, FirewallApi};
use crate::constants::DEFAULT_MAX_RULE_ADDRESSES;
use crate::errors::{FirewallError, MembershipOp, Result};
use crate::metrics;
use crate::model::{FirewallId, FirewallRule, NodeAddress};
use crate::retry::{cancellable, RetryScheduler};
use crate::rules::{has_address, members, with_address_added, with_address_removed};
use async_trait::async_trait;
use cas::{converge, CasResource, Outcome, Postcondition};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The rule list of one firewall, as a [`CasResource`].
///
/// Hetzner firewalls carry no version, so `write` is an unconditional
/// replacement and lost updates are detected by the verification read.
pub struct FirewallRules<'a> {
    api: &'a dyn FirewallApi,
    firewall_id: FirewallId,
}

impl<'a> FirewallRules<'a> {
    #[must_use]
    pub fn new(api: &'a dyn FirewallApi, firewall_id: FirewallId) -> Self {
        Self { api, firewall_id }
    }
}

#[async_trait]
impl<'a> CasResource for FirewallRules<'a> {
    type State = Vec<FirewallRule>;

    async fn read(&self, cancel: &CancellationToken) -> Result<Option<Vec<FirewallRule>>> {
        let firewall = cancellable(cancel, self.api.get_firewall(self.firewall_id)).await?;
        Ok(firewall.map(|fw| fw.rules))
    }

    async fn write(
        &self,
        _expected: &Vec<FirewallRule>,
        next: &Vec<FirewallRule>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let actions = cancellable(cancel, self.api.set_rules(self.firewall_id, next)).await?;
        for (action_id, err) in wait_for_actions(self.api, &actions, cancel).await? {
            warn!(
                "Firewall {} rule action {} failed: {}",
                self.firewall_id, action_id, err
            );
        }
        Ok(())
    }
}

/// Membership postcondition for one address.
struct Membership {
    operation: MembershipOp,
    address: NodeAddress,
    firewall_id: FirewallId,
    limit: usize,
}

impl Postcondition<Vec<FirewallRule>> for Membership {
    fn holds(&self, rules: &Vec<FirewallRule>) -> bool {
        let present = has_address(rules, self.address);
        match self.operation {
            MembershipOp::Add => present,
            MembershipOp::Remove => !present,
        }
    }

    fn next(&self, rules: &Vec<FirewallRule>) -> Result<Vec<FirewallRule>> {
        match self.operation {
            MembershipOp::Add => {
                if members(rules).len() >= self.limit {
                    return Err(FirewallError::MembershipLimit {
                        firewall_id: self.firewall_id,
                        limit: self.limit,
                        address: self.address.net(),
                    });
                }
                Ok(with_address_added(rules, self.address))
            }
            MembershipOp::Remove => Ok(with_address_removed(rules, self.address)),
        }
    }
}

/// Adds and removes node addresses in a shared firewall's internal rules.
pub struct NodeIpCoordinator {
    api: Arc<dyn FirewallApi>,
    scheduler: Arc<RetryScheduler>,
    max_rule_addresses: usize,
}

impl NodeIpCoordinator {
    #[must_use]
    pub fn new(api: Arc<dyn FirewallApi>, scheduler: Arc<RetryScheduler>) -> Self {
        Self {
            api,
            scheduler,
            max_rule_addresses: DEFAULT_MAX_RULE_ADDRESSES,
        }
    }

    /// Set the maximum number of addresses an internal rule may hold.
    #[must_use]
    pub fn with_max_rule_addresses(mut self, limit: usize) -> Self {
        self.max_rule_addresses = limit;
        self
    }

    /// Ensure `address` is a member of the firewall's internal rules.
    ///
    /// Creates the internal rules if the firewall has none yet.
    ///
    /// # Errors
    ///
    /// - [`FirewallError::NotFound`] if the firewall does not exist
    /// - [`FirewallError::MembershipLimit`] if the address does not fit
    /// - [`FirewallError::RetryExhausted`] if the address was never observed
    ///   present within the attempt budget
    /// - Terminal API errors, and [`FirewallError::Cancelled`]
    pub async fn add(
        &self,
        firewall_id: FirewallId,
        address: NodeAddress,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let result = self.update(MembershipOp::Add, firewall_id, address, cancel).await;
        let result = match result {
            Ok(Outcome::Missing { .. }) => Err(FirewallError::NotFound(firewall_id)),
            other => other.map(|_| ()),
        };
        Self::finish(MembershipOp::Add, firewall_id, address, result)
    }

    /// Ensure `address` is not a member of the firewall's internal rules.
    ///
    /// A missing firewall counts as success.
    ///
    /// # Errors
    ///
    /// - [`FirewallError::RetryExhausted`] if the address was never observed
    ///   absent within the attempt budget
    /// - Terminal API errors, and [`FirewallError::Cancelled`]
    pub async fn remove(
        &self,
        firewall_id: FirewallId,
        address: NodeAddress,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let result = self
            .update(MembershipOp::Remove, firewall_id, address, cancel)
            .await
            .map(|_| ());
        Self::finish(MembershipOp::Remove, firewall_id, address, result)
    }

    async fn update(
        &self,
        operation: MembershipOp,
        firewall_id: FirewallId,
        address: NodeAddress,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let resource = FirewallRules::new(self.api.as_ref(), firewall_id);
        let goal = Membership {
            operation,
            address,
            firewall_id,
            limit: self.max_rule_addresses,
        };
        let description = match operation {
            MembershipOp::Add => format!("add node address {address} to firewall {firewall_id}"),
            MembershipOp::Remove => {
                format!("remove node address {address} from firewall {firewall_id}")
            }
        };

        let outcome = converge(&resource, &goal, &self.scheduler, cancel, &description).await?;
        metrics::record_membership_retries(operation, outcome.attempts().saturating_sub(1));

        match outcome {
            Outcome::Exhausted { attempts, .. } => Err(FirewallError::RetryExhausted {
                operation,
                address: address.net(),
                attempts,
            }),
            other => Ok(other),
        }
    }

    fn finish(
        operation: MembershipOp,
        firewall_id: FirewallId,
        address: NodeAddress,
        result: Result<()>,
    ) -> Result<()> {
        match &result {
            Ok(()) => {
                info!(
                    "Node address {} {} firewall {}",
                    address,
                    match operation {
                        MembershipOp::Add => "is a member of",
                        MembershipOp::Remove => "is not a member of",
                    },
                    firewall_id
                );
                metrics::record_membership_update(operation, "success");
            }
            Err(err) => {
                error!(
                    "Failed to {} node address {} in firewall {}: {}",
                    operation, address, firewall_id, err
                );
                metrics::record_membership_update(operation, "error");
            }
        }
        result
    }
}
