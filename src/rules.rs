// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Firewall rule sets for RKE2 clusters.
//!
//! A shared firewall holds two kinds of rules:
//!
//! - **Public rules** - administrative and API access from anywhere plus
//!   unrestricted outbound traffic. Static, independent of membership.
//! - **Internal rules** - inter-node service ports restricted to the current
//!   node addresses. Every internal rule carries the same address set and a
//!   description ending in [`INTERNAL_RULE_SUFFIX`].
//!
//! The description suffix is the only thing distinguishing machine-managed
//! membership rules from public or user-authored rules, so membership is
//! always recovered from the remote rule list with [`partition`] and written
//! back by rebuilding every internal rule at once.
//!
//! # Example
//!
//! ```rust
//! use clusterfw::model::NodeAddress;
//! use clusterfw::rules::{has_address, public_rules, with_address_added};
//!
//! let node: NodeAddress = "10.0.0.1".parse().unwrap();
//! let rules = with_address_added(&public_rules(), node);
//! assert!(has_address(&rules, node));
//! ```

use crate::constants::INTERNAL_RULE_SUFFIX;
use crate::model::{AddressList, Direction, FirewallRule, NodeAddress, Protocol};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

fn any_address() -> AddressList {
    [
        Ipv4Net::new(Ipv4Addr::UNSPECIFIED, 0).map(IpNet::V4),
        Ipv6Net::new(Ipv6Addr::UNSPECIFIED, 0).map(IpNet::V6),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn inbound(
    protocol: Protocol,
    port: Option<&str>,
    sources: &AddressList,
    description: &str,
) -> FirewallRule {
    FirewallRule {
        direction: Direction::In,
        protocol,
        port: port.map(str::to_string),
        source_ips: sources.clone(),
        destination_ips: AddressList::default(),
        description: Some(description.to_string()),
    }
}

fn outbound(
    protocol: Protocol,
    port: Option<&str>,
    destinations: &AddressList,
    description: &str,
) -> FirewallRule {
    FirewallRule {
        direction: Direction::Out,
        protocol,
        port: port.map(str::to_string),
        source_ips: AddressList::default(),
        destination_ips: destinations.clone(),
        description: Some(description.to_string()),
    }
}

/// Rules for ports that are typically reachable from anywhere.
///
/// SSH, the Kubernetes API, NodePorts and ICMP are open to `0.0.0.0/0` and
/// `::/0`; all outbound TCP, UDP and ICMP is allowed. Clusters needing tighter
/// source ranges should manage their own rules instead.
#[must_use]
pub fn public_rules() -> Vec<FirewallRule> {
    let any = any_address();
    vec![
        inbound(Protocol::Tcp, Some("22"), &any, "SSH"),
        inbound(Protocol::Tcp, Some("6443"), &any, "Kubernetes API server"),
        inbound(Protocol::Tcp, Some("30000-32767"), &any, "NodePort services (TCP)"),
        inbound(Protocol::Udp, Some("30000-32767"), &any, "NodePort services (UDP)"),
        inbound(Protocol::Icmp, None, &any, "ICMP"),
        outbound(Protocol::Tcp, Some("1-65535"), &any, "All outbound TCP"),
        outbound(Protocol::Udp, Some("1-65535"), &any, "All outbound UDP"),
        outbound(Protocol::Icmp, None, &any, "All outbound ICMP"),
    ]
}

/// Inter-node service ports: (protocol, port, description without suffix).
const INTERNAL_PORTS: &[(Protocol, &str, &str)] = &[
    (Protocol::Tcp, "9345", "RKE2 supervisor API"),
    (Protocol::Tcp, "2379-2381", "etcd client, peer, and metrics"),
    (Protocol::Tcp, "10250", "kubelet metrics"),
    (Protocol::Udp, "8472", "VXLAN overlay"),
    (Protocol::Tcp, "9099", "Canal CNI health checks"),
    (Protocol::Udp, "51820-51821", "WireGuard IPv4/IPv6"),
];

/// Rules for inter-node traffic, restricted to `addresses`.
///
/// Returns no rules for an empty set. All returned rules share a single
/// address list allocation.
#[must_use]
pub fn internal_rules(addresses: &BTreeSet<IpNet>) -> Vec<FirewallRule> {
    if addresses.is_empty() {
        return Vec::new();
    }
    let sources: AddressList = addresses.iter().copied().collect();

    INTERNAL_PORTS
        .iter()
        .map(|(protocol, port, name)| {
            inbound(
                *protocol,
                Some(port),
                &sources,
                &format!("{name} {INTERNAL_RULE_SUFFIX}"),
            )
        })
        .collect()
}

/// Returns true if `rule` is a machine-managed membership rule.
#[must_use]
pub fn is_internal(rule: &FirewallRule) -> bool {
    rule.description
        .as_deref()
        .is_some_and(|d| d.ends_with(INTERNAL_RULE_SUFFIX))
}

/// Split rules into the non-internal rules to preserve and the union of all
/// addresses found across internal rules.
#[must_use]
pub fn partition(rules: &[FirewallRule]) -> (Vec<FirewallRule>, BTreeSet<IpNet>) {
    let mut keep = Vec::new();
    let mut members = BTreeSet::new();
    for rule in rules {
        if is_internal(rule) {
            members.extend(rule.source_ips.iter().copied());
        } else {
            keep.push(rule.clone());
        }
    }
    (keep, members)
}

/// Current membership recorded in `rules`.
#[must_use]
pub fn members(rules: &[FirewallRule]) -> BTreeSet<IpNet> {
    rules
        .iter()
        .filter(|r| is_internal(r))
        .flat_map(|r| r.source_ips.iter().copied())
        .collect()
}

/// Returns true if any internal rule lists `address`.
#[must_use]
pub fn has_address(rules: &[FirewallRule], address: NodeAddress) -> bool {
    let net = address.net();
    rules
        .iter()
        .filter(|r| is_internal(r))
        .any(|r| r.source_ips.contains(&net))
}

fn rebuild(
    rules: &[FirewallRule],
    mutate: impl FnOnce(&mut BTreeSet<IpNet>),
) -> Vec<FirewallRule> {
    let (mut keep, mut addresses) = partition(rules);
    mutate(&mut addresses);
    keep.extend(internal_rules(&addresses));
    keep
}

/// Rules with `address` added to every internal rule.
///
/// If no internal rules exist yet they are created for `address` alone.
#[must_use]
pub fn with_address_added(rules: &[FirewallRule], address: NodeAddress) -> Vec<FirewallRule> {
    rebuild(rules, |set| {
        set.insert(address.net());
    })
}

/// Rules with `address` removed; internal rules disappear with the last member.
#[must_use]
pub fn with_address_removed(rules: &[FirewallRule], address: NodeAddress) -> Vec<FirewallRule> {
    rebuild(rules, |set| {
        set.remove(&address.net());
    })
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod rules_tests;
