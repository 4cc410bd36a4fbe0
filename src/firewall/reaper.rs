// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deletion of shared firewalls that no server uses anymore.
//!
//! Reaping is best-effort cleanup on the node-removal path, so it never fails:
//! every outcome is reported as a [`ReapOutcome`] and logged.

use crate::api::FirewallApi;
use crate::errors::ErrorCode;
use crate::metrics;
use crate::model::FirewallId;
use crate::retry::cancellable;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of an orphan check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Resources are still attached; no delete was issued
    Kept { attached: usize },
    /// The firewall no longer exists
    AlreadyGone,
    /// The firewall was deleted
    Deleted,
    /// A server was attached between the check and the delete
    InUse,
    /// The check or the delete failed for another reason
    Failed(String),
}

impl ReapOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Kept { .. } => "kept",
            Self::AlreadyGone => "already_gone",
            Self::Deleted => "deleted",
            Self::InUse => "in_use",
            Self::Failed(_) => "reap_failed",
        }
    }
}

/// Delete the firewall if nothing is attached to it.
pub async fn delete_if_orphaned(
    api: &dyn FirewallApi,
    firewall_id: FirewallId,
    cancel: &CancellationToken,
) -> ReapOutcome {
    let outcome = reap(api, firewall_id, cancel).await;
    metrics::record_firewall_event(outcome.as_str());
    outcome
}

async fn reap(
    api: &dyn FirewallApi,
    firewall_id: FirewallId,
    cancel: &CancellationToken,
) -> ReapOutcome {
    let firewall = match cancellable(cancel, api.get_firewall(firewall_id)).await {
        Ok(Some(firewall)) => firewall,
        Ok(None) => return ReapOutcome::AlreadyGone,
        Err(err) => {
            warn!(
                "Failed to get firewall {} for orphan check: {}",
                firewall_id, err
            );
            return ReapOutcome::Failed(err.to_string());
        }
    };

    if !firewall.applied_to.is_empty() {
        info!(
            "Firewall {:?} still has {} attached resources, keeping it",
            firewall.name,
            firewall.applied_to.len()
        );
        return ReapOutcome::Kept {
            attached: firewall.applied_to.len(),
        };
    }

    match cancellable(cancel, api.delete_firewall(firewall_id)).await {
        Ok(()) => {
            info!(
                "Deleted orphaned firewall {:?} (ID={})",
                firewall.name, firewall_id
            );
            ReapOutcome::Deleted
        }
        Err(err) if err.has_code(ErrorCode::ResourceInUse) => {
            info!(
                "Firewall {:?} still in use (concurrent attach), keeping it",
                firewall.name
            );
            ReapOutcome::InUse
        }
        Err(err) if err.has_code(ErrorCode::NotFound) => ReapOutcome::AlreadyGone,
        Err(err) => {
            warn!(
                "Failed to delete orphaned firewall {}: {}",
                firewall_id, err
            );
            ReapOutcome::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod reaper_tests;
