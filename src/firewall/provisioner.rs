// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Find-or-create of the cluster's shared firewall.
//!
//! There is no lock deciding which node creates the firewall. Every node that
//! finds nothing tries to create it; the API's name uniqueness lets exactly one
//! succeed, and the losers re-read and adopt the winner's firewall.

use crate::api::{wait_for_actions, CreateFirewallRequest, FirewallApi};
use crate::errors::{FirewallError, Result};
use crate::labels::{default_firewall_name, firewall_labels};
use crate::metrics;
use crate::model::{Firewall, NodeAddress};
use crate::retry::cancellable;
use crate::rules::{internal_rules, public_rules};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::locator::find;

/// What to create when the cluster has no firewall yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    /// Sanitized cluster identifier
    pub cluster_id: String,
    /// Explicit firewall name; defaults to `rancher-<cluster_id>`
    pub name: Option<String>,
    /// Address of the creating node
    pub initial_address: Option<NodeAddress>,
    /// Create the firewall with public rules plus internal rules for
    /// `initial_address`, instead of empty
    pub populate_rules: bool,
}

impl ProvisionRequest {
    /// Name the firewall is created with.
    #[must_use]
    pub fn firewall_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_firewall_name(&self.cluster_id),
        }
    }

    fn create_request(&self) -> Result<CreateFirewallRequest> {
        let rules = if self.populate_rules {
            let address = self.initial_address.ok_or_else(|| {
                FirewallError::Configuration(
                    "populating firewall rules requires the node's public IPv4 address".into(),
                )
            })?;
            let mut rules = public_rules();
            rules.extend(internal_rules(&BTreeSet::from([address.net()])));
            rules
        } else {
            Vec::new()
        };

        Ok(CreateFirewallRequest {
            name: self.firewall_name(),
            labels: firewall_labels(&self.cluster_id),
            rules,
        })
    }
}

/// The cluster's firewall and whether this call created it.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub firewall: Firewall,
    /// True only if this call created the firewall, in which case the initial
    /// address is already part of its rules (when rules were populated)
    pub created: bool,
}

/// Find the cluster's shared firewall, creating it if none exists.
///
/// If creation fails, the firewall is looked up once more: a single match is
/// taken to be a concurrent creation by another node and is returned with
/// `created = false`. Failures of the actions triggered by a successful
/// creation are logged, not returned.
///
/// # Errors
///
/// - [`FirewallError::Configuration`] if rules are to be populated without an
///   initial address (checked before any remote call)
/// - [`FirewallError::DuplicateResource`] from the initial lookup
/// - The creation error, if the fallback lookup does not find exactly one firewall
pub async fn find_or_create(
    api: &dyn FirewallApi,
    request: &ProvisionRequest,
    cancel: &CancellationToken,
) -> Result<Provisioned> {
    let create = request.create_request()?;

    if let Some(firewall) = find(api, &request.cluster_id, cancel).await? {
        info!(
            "Found existing shared firewall {:?} (ID={})",
            firewall.name, firewall.id
        );
        metrics::record_firewall_event("found");
        return Ok(Provisioned {
            firewall,
            created: false,
        });
    }

    if create.rules.is_empty() {
        info!("Creating shared firewall {:?} (no rules)", create.name);
    } else {
        info!(
            "Creating shared firewall {:?} with {} rules",
            create.name,
            create.rules.len()
        );
    }

    let created = match cancellable(cancel, api.create_firewall(&create)).await {
        Ok(created) => created,
        Err(create_err) => {
            info!(
                "Firewall create failed ({}), checking if it was created concurrently",
                create_err
            );
            return match find(api, &request.cluster_id, cancel).await {
                Ok(Some(firewall)) => {
                    info!(
                        "Firewall {:?} was created concurrently (ID={}), using it",
                        firewall.name, firewall.id
                    );
                    metrics::record_firewall_event("create_race_resolved");
                    Ok(Provisioned {
                        firewall,
                        created: false,
                    })
                }
                Ok(None) | Err(_) => Err(create_err),
            };
        }
    };

    for (action_id, err) in wait_for_actions(api, &created.actions, cancel).await? {
        warn!("Firewall creation action {} failed: {}", action_id, err);
    }

    info!(
        "Shared firewall {:?} created (ID={})",
        created.firewall.name, created.firewall.id
    );
    metrics::record_firewall_event("created");
    Ok(Provisioned {
        firewall: created.firewall,
        created: true,
    })
}

#[cfg(test)]
#[path = "provisioner_tests.rs"]
mod provisioner_tests;
