// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for clusterfw.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Hetzner Cloud API Constants
// ============================================================================

/// Default Hetzner Cloud API endpoint
pub const DEFAULT_API_ENDPOINT: &str = "https://api.hetzner.cloud/v1";

/// Page size used when listing firewalls by label selector
pub const LIST_PAGE_SIZE: u32 = 50;

/// Timeout for a single HTTP request to the cloud API (30 seconds)
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Interval between polls of an asynchronous action (500ms)
pub const ACTION_POLL_INTERVAL_MILLIS: u64 = 500;

/// Overall deadline for a join or leave operation (5 minutes)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Firewall Labeling
// ============================================================================

/// Maximum length of a Hetzner Cloud label value
pub const LABEL_VALUE_MAX_LEN: usize = 63;

/// Prefix of the default shared firewall name (`rancher-<cluster-id>`)
pub const FIREWALL_NAME_PREFIX: &str = "rancher-";

// ============================================================================
// Membership Rules
// ============================================================================

/// Description suffix marking a rule as machine-managed cluster membership
pub const INTERNAL_RULE_SUFFIX: &str = "(cluster nodes only)";

/// Default ceiling on addresses held by one internal rule
pub const DEFAULT_MAX_RULE_ADDRESSES: usize = 100;

// ============================================================================
// Retry Constants
// ============================================================================

/// Maximum attempts of one membership update (add or remove)
pub const MAX_FIREWALL_RETRIES: u32 = 10;

/// Initial retry delay (100ms)
pub const RETRY_BASE_DELAY_MILLIS: u64 = 100;

/// Maximum delay between retries (5 seconds)
pub const RETRY_MAX_DELAY_MILLIS: u64 = 5_000;

/// Backoff multiplier (exponential growth factor)
pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Lower bound of the jitter factor applied to every delay (-25%)
pub const RETRY_JITTER_MIN: f64 = 0.75;

/// Upper bound of the jitter factor applied to every delay (+25%)
pub const RETRY_JITTER_MAX: f64 = 1.25;
