// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration.
//!
//! Two kinds of configuration exist:
//!
//! - [`Settings`] - tuning of the API client and the retry loop, read from an
//!   optional YAML file. Every field has a default, so an empty file (or no
//!   file at all) is valid.
//! - [`NodeFirewallConfig`] - how one node takes part in the shared firewall,
//!   supplied per node (CLI flags or `HETZNER_*` environment variables).
//!   [`NodeFirewallConfig::validated`] runs the pre-create checks.
//!
//! # Example settings file
//!
//! ```yaml
//! apiEndpoint: https://api.hetzner.cloud/v1
//! actionPollIntervalMillis: 500
//! operationTimeoutSecs: 300
//! maxRuleAddresses: 100
//! retry:
//!   baseDelay: 100
//!   multiplier: 2.0
//!   maxDelay: 5000
//!   maxAttempts: 10
//! ```

use crate::constants::{
    ACTION_POLL_INTERVAL_MILLIS, DEFAULT_API_ENDPOINT, DEFAULT_MAX_RULE_ADDRESSES,
    DEFAULT_OPERATION_TIMEOUT_SECS,
};
use crate::errors::{FirewallError, Result};
use crate::labels::{cluster_id_from_machine_name, validate_cluster_id};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

// ============================================================================
// Settings
// ============================================================================

/// Client and retry tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Base URL of the Hetzner Cloud API
    pub api_endpoint: String,
    /// Interval between polls of a running action
    pub action_poll_interval_millis: u64,
    /// Deadline of one CLI command, covering every retry
    pub operation_timeout_secs: u64,
    /// Maximum number of node addresses in an internal rule
    pub max_rule_addresses: usize,
    /// Backoff of membership updates
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            action_poll_interval_millis: ACTION_POLL_INTERVAL_MILLIS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            max_rule_addresses: DEFAULT_MAX_RULE_ADDRESSES,
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    /// Parse and validate settings from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::Configuration`] if the YAML is malformed or a
    /// value is out of range.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to `null`, not to an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(yaml)
            .map_err(|e| FirewallError::Configuration(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::Configuration`] if the file cannot be read or
    /// its content is invalid.
    pub async fn load(path: &Path) -> Result<Self> {
        let yaml = tokio::fs::read_to_string(path).await.map_err(|e| {
            FirewallError::Configuration(format!(
                "failed to read settings file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let endpoint = Url::parse(&self.api_endpoint).map_err(|e| {
            FirewallError::Configuration(format!("apiEndpoint {:?}: {e}", self.api_endpoint))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(FirewallError::Configuration(format!(
                "apiEndpoint {:?} must use http or https",
                self.api_endpoint
            )));
        }
        if self.max_rule_addresses == 0 {
            return Err(FirewallError::Configuration(
                "maxRuleAddresses must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(FirewallError::Configuration(
                "retry.maxAttempts must be at least 1".into(),
            ));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(FirewallError::Configuration(format!(
                "retry.multiplier must be at least 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(FirewallError::Configuration(
                "retry.baseDelay must not exceed retry.maxDelay".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn action_poll_interval(&self) -> Duration {
        Duration::from_millis(self.action_poll_interval_millis)
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

// ============================================================================
// Node Firewall Configuration
// ============================================================================

/// How a node takes part in its cluster's shared firewall.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeFirewallConfig {
    /// Find or create the shared firewall and attach it to this node's server.
    /// Nodes with this set own the firewall and may delete it when orphaned.
    pub manage_firewall: bool,
    /// Name of a created firewall (default `rancher-<cluster_id>`)
    pub firewall_name: Option<String>,
    /// Create the firewall with the standard public and internal rules
    pub populate_rules: bool,
    /// Cluster identifier; must be a valid label value
    pub cluster_id: String,
    /// Pre-existing firewalls applied by the compute layer instead
    pub static_firewalls: Vec<String>,
    pub disable_public_ipv4: bool,
    pub disable_public_ipv6: bool,
    /// Machine name, used to derive a missing cluster identifier
    pub machine_name: Option<String>,
}

impl NodeFirewallConfig {
    /// Run the pre-create checks, before any remote call.
    ///
    /// A managing node without a cluster identifier gets one derived from its
    /// machine name. Combinations that work but leave the node unreachable
    /// from its peers are logged as warnings.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::Configuration`] if:
    /// - rules are to be populated while the public IPv4 address is disabled
    /// - both a managed and static firewalls are requested
    /// - a managing node has no cluster identifier and none can be derived
    /// - the cluster identifier is not a valid label value
    pub fn validated(mut self) -> Result<Self> {
        if self.manage_firewall && self.populate_rules && self.disable_public_ipv4 {
            return Err(FirewallError::Configuration(
                "cannot populate firewall rules when public IPv4 is disabled: \
                 firewall rules require a public IPv4 address"
                    .into(),
            ));
        }
        if self.manage_firewall && self.disable_public_ipv4 {
            warn!(
                "Public IPv4 is disabled but the shared firewall is managed: this node's \
                 address cannot be added to the internal rules, so other nodes' firewalls \
                 may block traffic from it"
            );
        }
        if self.manage_firewall && !self.static_firewalls.is_empty() {
            return Err(FirewallError::Configuration(
                "cannot both manage a shared firewall and apply static firewalls; \
                 choose one firewall mode"
                    .into(),
            ));
        }
        if self.manage_firewall && self.cluster_id.is_empty() {
            let derived = self
                .machine_name
                .as_deref()
                .map(cluster_id_from_machine_name)
                .unwrap_or_default();
            if derived.is_empty() {
                return Err(FirewallError::Configuration(
                    "a cluster ID is required when the shared firewall is managed; \
                     it identifies the shared firewall across all node pools"
                        .into(),
                ));
            }
            info!(
                "Derived cluster ID {:?} from machine name {:?}",
                derived,
                self.machine_name.as_deref().unwrap_or_default()
            );
            self.cluster_id = derived;
        }
        validate_cluster_id(&self.cluster_id)?;
        if self.disable_public_ipv4 && !self.disable_public_ipv6 && !self.cluster_id.is_empty() {
            warn!(
                "IPv6-only node in cluster {:?}: internal rules only list IPv4 sources, \
                 so this node's traffic may be blocked by other nodes' firewalls",
                self.cluster_id
            );
        }
        Ok(self)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
