// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Locate a cluster's shared firewall by label selector.

use crate::api::FirewallApi;
use crate::errors::{FirewallError, Result};
use crate::labels::cluster_selector;
use crate::model::Firewall;
use crate::retry::cancellable;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Find the shared firewall of `cluster_id`.
///
/// Returns `Ok(None)` when no firewall carries the cluster's labels.
///
/// # Errors
///
/// - [`FirewallError::DuplicateResource`] if more than one firewall matches.
///   Duplicates are never resolved by picking one; they need manual cleanup.
/// - Any error from listing firewalls.
pub async fn find(
    api: &dyn FirewallApi,
    cluster_id: &str,
    cancel: &CancellationToken,
) -> Result<Option<Firewall>> {
    let selector = cluster_selector(cluster_id);
    let mut matches = cancellable(cancel, api.list_firewalls(&selector)).await?;

    debug!(
        "Found {} firewall(s) for selector {:?}",
        matches.len(),
        selector
    );

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(FirewallError::DuplicateResource { selector, count }),
    }
}

#[cfg(test)]
#[path = "locator_tests.rs"]
mod locator_tests;
