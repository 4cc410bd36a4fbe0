// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resource types exchanged with the cloud API.
//!
//! Field names follow the Hetzner Cloud API JSON representation so the same
//! types are used on the wire and in memory.

use crate::errors::{ErrorCode, FirewallError};
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// Identifier of a firewall resource
pub type FirewallId = u64;

/// Identifier of a server (compute instance)
pub type ServerId = u64;

/// Identifier of an asynchronous action
pub type ActionId = u64;

/// Address list of a rule.
///
/// Internal rules built together share one allocation, so a membership change
/// always rebuilds every internal rule at once.
pub type AddressList = Arc<[IpNet]>;

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// Protocol a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Esp,
    Gre,
}

/// A single firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub direction: Direction,
    pub protocol: Protocol,
    /// Port or port range (`"22"`, `"30000-32767"`); absent for ICMP/ESP/GRE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default)]
    pub source_ips: AddressList,
    #[serde(default)]
    pub destination_ips: AddressList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Reference to a server a firewall is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRef {
    pub id: ServerId,
}

/// Label selector a firewall is applied through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelectorRef {
    pub selector: String,
}

/// A resource a firewall is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppliedResource {
    Server { server: ServerRef },
    LabelSelector { label_selector: LabelSelectorRef },
    #[serde(other)]
    Other,
}

impl AppliedResource {
    /// Attachment of a single server.
    #[must_use]
    pub fn server(id: ServerId) -> Self {
        Self::Server {
            server: ServerRef { id },
        }
    }
}

/// Shared firewall resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firewall {
    pub id: FirewallId,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: Vec<FirewallRule>,
    #[serde(default)]
    pub applied_to: Vec<AppliedResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Status of an asynchronous action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

/// Error reported by a failed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub code: ErrorCode,
    pub message: String,
}

/// Asynchronous operation triggered by a mutating API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub command: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<ActionError>,
}

impl Action {
    /// Returns true once the action reached `success` or `error`.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status != ActionStatus::Running
    }
}

/// A node's public address, always a single-host network (`/32` or `/128`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress(IpNet);

impl NodeAddress {
    /// Build the single-host network for `ip`.
    ///
    /// IPv4-mapped IPv6 addresses are stored as plain IPv4.
    #[must_use]
    pub fn from_ip(ip: IpAddr) -> Self {
        let ip = match ip {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .map_or(IpAddr::V6(v6), IpAddr::V4),
            v4 @ IpAddr::V4(_) => v4,
        };
        Self(IpNet::from(ip))
    }

    /// The address as a network with all host bits set in the prefix.
    #[must_use]
    pub fn net(&self) -> IpNet {
        self.0
    }

    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.0.addr()
    }
}

impl FromStr for NodeAddress {
    type Err = FirewallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::from_ip(ip));
        }
        match s.parse::<IpNet>() {
            Ok(net) if net.prefix_len() == net.max_prefix_len() => Ok(Self::from_ip(net.addr())),
            _ => Err(FirewallError::InvalidAddress(s.to_string())),
        }
    }
}

impl From<NodeAddress> for IpNet {
    fn from(addr: NodeAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;
