// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common test utilities for integration tests

#![allow(dead_code)]

use clusterfw::api::memory::InMemoryFirewallApi;
use clusterfw::config::NodeFirewallConfig;
use clusterfw::coordinator::NodeIpCoordinator;
use clusterfw::lifecycle::NodeFirewall;
use clusterfw::model::{FirewallId, NodeAddress};
use clusterfw::retry::{RetryPolicy, RetryScheduler};
use clusterfw::rules::members;
use ipnet::IpNet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const CLUSTER_ID: &str = "demo";

pub fn addr(s: &str) -> NodeAddress {
    s.parse().expect("valid test address")
}

pub fn nets(addrs: &[&str]) -> BTreeSet<IpNet> {
    addrs.iter().map(|a| addr(a).net()).collect()
}

/// Seeded scheduler; distinct seeds give nodes distinct jitter.
pub fn scheduler(seed: u64) -> Arc<RetryScheduler> {
    Arc::new(RetryScheduler::with_rng(
        RetryPolicy::default(),
        StdRng::seed_from_u64(seed),
    ))
}

/// Configuration of a node that manages the shared firewall.
pub fn managing_config(populate_rules: bool) -> NodeFirewallConfig {
    NodeFirewallConfig {
        manage_firewall: true,
        populate_rules,
        cluster_id: CLUSTER_ID.to_string(),
        ..NodeFirewallConfig::default()
    }
    .validated()
    .expect("valid node configuration")
}

pub fn node(api: &Arc<InMemoryFirewallApi>, config: NodeFirewallConfig, seed: u64) -> NodeFirewall {
    NodeFirewall::new(api.clone(), config, scheduler(seed))
}

pub fn coordinator(api: &Arc<InMemoryFirewallApi>, seed: u64) -> NodeIpCoordinator {
    NodeIpCoordinator::new(api.clone(), scheduler(seed))
}

/// Addresses listed in the internal rules of a stored firewall.
pub fn member_set(api: &InMemoryFirewallApi, id: FirewallId) -> BTreeSet<IpNet> {
    members(&api.firewall(id).expect("firewall exists").rules)
}
