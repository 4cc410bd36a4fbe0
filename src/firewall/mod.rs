// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared firewall lifecycle.
//!
//! One firewall per cluster, found by its labels:
//!
//! - [`locator`] - find the cluster's firewall, rejecting duplicates
//! - [`provisioner`] - find-or-create, resolving concurrent creations
//! - [`attach`] - apply the firewall to a server
//! - [`reaper`] - delete the firewall once nothing is attached to it
//!
//! Membership of the firewall's internal rules is handled separately by
//! [`crate::coordinator`].

pub mod attach;
pub mod locator;
pub mod provisioner;
pub mod reaper;

pub use attach::attach_to_server;
pub use locator::find;
pub use provisioner::{find_or_create, ProvisionRequest, Provisioned};
pub use reaper::{delete_if_orphaned, ReapOutcome};
