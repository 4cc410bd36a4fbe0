// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for shared firewall coordination.
//!
//! All metrics carry the `clusterfw_` prefix and live in [`METRICS_REGISTRY`].
//! The CLI prints them after a command with `--print-metrics`, which is how a
//! provisioning wrapper scrapes a single short-lived run.
//!
//! # Metrics Categories
//!
//! - **Membership Metrics** - address additions and removals, and their retries
//! - **Firewall Lifecycle Metrics** - found, created, adopted, reaped
//!
//! # Example
//!
//! ```rust,no_run
//! use clusterfw::errors::MembershipOp;
//! use clusterfw::metrics::{gather_metrics, record_membership_update};
//!
//! record_membership_update(MembershipOp::Add, "success");
//! println!("{}", gather_metrics().unwrap());
//! ```

use crate::errors::MembershipOp;
use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::LazyLock;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "clusterfw";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Membership Metrics
// ============================================================================

/// Total number of membership updates by operation and result
///
/// Labels:
/// - `operation`: `add` or `remove`
/// - `result`: `success` or `error`
pub static MEMBERSHIP_UPDATES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_membership_updates_total"),
        "Total number of node address membership updates by operation and result",
    );
    let counter = CounterVec::new(opts, &["operation", "result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of retried membership attempts
///
/// Labels:
/// - `operation`: `add` or `remove`
pub static MEMBERSHIP_RETRIES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_membership_retries_total"),
        "Total number of retried node address membership attempts by operation",
    );
    let counter = CounterVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Firewall Lifecycle Metrics
// ============================================================================

/// Total number of shared firewall lifecycle events
///
/// Labels:
/// - `event`: `found`, `created`, `create_race_resolved`, `deleted`, `kept`,
///   `in_use`, `already_gone`, `reap_failed`
pub static FIREWALL_EVENTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_firewall_events_total"),
        "Total number of shared firewall lifecycle events by event",
    );
    let counter = CounterVec::new(opts, &["event"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record the result of a membership update
///
/// # Arguments
/// * `operation` - Add or remove
/// * `result` - `success` or `error`
pub fn record_membership_update(operation: MembershipOp, result: &str) {
    MEMBERSHIP_UPDATES_TOTAL
        .with_label_values(&[operation.as_str(), result])
        .inc();
}

/// Record retried attempts of a membership update
pub fn record_membership_retries(operation: MembershipOp, retries: u32) {
    if retries > 0 {
        MEMBERSHIP_RETRIES_TOTAL
            .with_label_values(&[operation.as_str()])
            .inc_by(f64::from(retries));
    }
}

/// Record a shared firewall lifecycle event
pub fn record_firewall_event(event: &str) {
    FIREWALL_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
