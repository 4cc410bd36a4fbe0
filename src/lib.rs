// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # clusterfw - Shared Cluster Firewalls for Hetzner Cloud
//!
//! clusterfw keeps one Hetzner Cloud firewall per cluster and coordinates
//! many independent, concurrently provisioning nodes around it. The firewall
//! is identified by labels, attached to every managing node's server, and
//! its "internal" rules list the public IPv4 address of every node in the
//! cluster.
//!
//! ## Overview
//!
//! Nodes never talk to each other. The remote firewall is the only shared
//! state, and the API offers no compare-and-swap. Membership changes are
//! therefore read-modify-write cycles that read back their result and retry
//! with jittered exponential backoff until the node's address is present (or
//! absent) or the attempt budget is spent.
//!
//! ## Modules
//!
//! - [`labels`] - cluster identifier sanitization, validation and label selectors
//! - [`rules`] - public and internal rule sets, partitioning and membership edits
//! - [`retry`] - backoff policy, jitter and cancellation helpers
//! - [`errors`] / [`http_errors`] - error taxonomy and terminal/transient classification
//! - [`firewall`] - locating, provisioning, attaching and reaping the shared firewall
//! - [`coordinator`] - convergent address addition and removal
//! - [`lifecycle`] - the join, leave and reap paths of a node
//! - [`api`] / [`hcloud`] - the cloud API trait, its in-memory and HTTP backends
//! - [`config`] - settings file and per-node firewall configuration
//! - [`metrics`] - Prometheus counters
//!
//! ## Example
//!
//! ```rust,no_run
//! use clusterfw::api::memory::InMemoryFirewallApi;
//! use clusterfw::config::NodeFirewallConfig;
//! use clusterfw::lifecycle::NodeFirewall;
//! use clusterfw::retry::RetryScheduler;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> clusterfw::errors::Result<()> {
//! let config = NodeFirewallConfig {
//!     manage_firewall: true,
//!     populate_rules: true,
//!     cluster_id: "demo".to_string(),
//!     ..NodeFirewallConfig::default()
//! }
//! .validated()?;
//!
//! let node = NodeFirewall::new(
//!     Arc::new(InMemoryFirewallApi::new()),
//!     config,
//!     Arc::new(RetryScheduler::default()),
//! );
//! let state = node
//!     .join(42, Some("203.0.113.10".parse()?), &CancellationToken::new())
//!     .await?;
//! println!("joined firewall {:?}", state.firewall_id);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod errors;
pub mod firewall;
pub mod hcloud;
pub mod http_errors;
pub mod labels;
pub mod lifecycle;
pub mod metrics;
pub mod model;
pub mod retry;
pub mod rules;
