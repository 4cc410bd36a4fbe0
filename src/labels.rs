// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label constants and cluster identity handling.
//!
//! The shared firewall of a cluster is found purely by its labels, so the
//! cluster identifier must be a valid Hetzner Cloud label value. Hetzner label
//! values allow ASCII letters, digits, `-`, `_` and `.`, up to 63 characters.
//!
//! Operator-supplied identifiers are validated, never silently rewritten:
//! [`validate_cluster_id`] rejects any value that [`sanitize_cluster_id`] would
//! change, and reports the sanitized form so the operator can correct it.

use crate::constants::{FIREWALL_NAME_PREFIX, LABEL_VALUE_MAX_LEN};
use crate::errors::FirewallError;
use std::collections::BTreeMap;

// ============================================================================
// Label Keys and Values
// ============================================================================

/// Label identifying the tool that manages the resource
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Value of [`MANAGED_BY_LABEL`] on every resource this crate creates
pub const MANAGED_BY_VALUE: &str = "rancher-machine";

/// Label carrying the sanitized cluster identifier
pub const CLUSTER_LABEL: &str = "cluster";

// ============================================================================
// Cluster Identity
// ============================================================================

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Normalize an arbitrary string into a valid label value.
///
/// Every character outside `[A-Za-z0-9._-]` becomes `-`, runs of `-` collapse
/// into one, leading and trailing `-` are trimmed, and the result is truncated
/// to 63 characters without leaving a trailing `-`.
///
/// # Example
///
/// ```rust
/// use clusterfw::labels::sanitize_cluster_id;
///
/// assert_eq!(sanitize_cluster_id("my cluster/pool #1"), "my-cluster-pool-1");
/// ```
#[must_use]
pub fn sanitize_cluster_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if is_label_char(c) { c } else { '-' };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches('-');
    if trimmed.len() <= LABEL_VALUE_MAX_LEN {
        return trimmed.to_string();
    }
    // Only ASCII remains at this point, so byte truncation is safe
    trimmed[..LABEL_VALUE_MAX_LEN]
        .trim_end_matches('-')
        .to_string()
}

/// Check that a cluster identifier is usable as a label value as-is.
///
/// An empty identifier is valid and means "no cluster labeling".
///
/// # Errors
///
/// Returns [`FirewallError::Configuration`] if the identifier contains only
/// invalid characters, or if sanitizing it would change it.
pub fn validate_cluster_id(raw: &str) -> Result<(), FirewallError> {
    if raw.is_empty() {
        return Ok(());
    }
    let sanitized = sanitize_cluster_id(raw);
    if sanitized.is_empty() {
        return Err(FirewallError::Configuration(format!(
            "cluster id {raw:?} contains only invalid characters; labels allow alphanumeric \
             characters, hyphens, underscores, and dots (max {LABEL_VALUE_MAX_LEN} chars)"
        )));
    }
    if sanitized != raw {
        return Err(FirewallError::Configuration(format!(
            "cluster id {raw:?} contains characters not allowed in labels; allowed: \
             alphanumeric, hyphens, underscores, dots (max {LABEL_VALUE_MAX_LEN} chars); \
             sanitized form would be {sanitized:?}"
        )));
    }
    Ok(())
}

fn is_hash_segment(segment: &str) -> bool {
    segment.len() == 5
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Derive the cluster identifier from a Rancher machine name.
///
/// Rancher names machines `<cluster>-<pool>-<hash5>-<hash5>`. The pool and
/// both hash segments are stripped and the remaining prefix is sanitized.
/// Returns an empty string when the name does not follow that pattern.
///
/// Pool names containing hyphens lose only their last segment, so such
/// clusters must set the cluster id explicitly.
#[must_use]
pub fn cluster_id_from_machine_name(name: &str) -> String {
    let mut parts = name.rsplitn(4, '-');
    let (Some(machine_hash), Some(set_hash), Some(pool), Some(prefix)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return String::new();
    };

    let pool_ok = !pool.is_empty()
        && pool
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if !pool_ok || !is_hash_segment(set_hash) || !is_hash_segment(machine_hash) || prefix.is_empty()
    {
        return String::new();
    }
    sanitize_cluster_id(prefix)
}

// ============================================================================
// Selectors and Label Maps
// ============================================================================

/// Label selector matching the shared firewall of `cluster_id`.
#[must_use]
pub fn cluster_selector(cluster_id: &str) -> String {
    format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE},{CLUSTER_LABEL}={cluster_id}")
}

/// Labels placed on a newly created shared firewall.
#[must_use]
pub fn firewall_labels(cluster_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (CLUSTER_LABEL.to_string(), cluster_id.to_string()),
    ])
}

/// Default name of the shared firewall: `rancher-<cluster-id>`.
#[must_use]
pub fn default_firewall_name(cluster_id: &str) -> String {
    format!("{FIREWALL_NAME_PREFIX}{cluster_id}")
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;
