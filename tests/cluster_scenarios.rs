// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end membership scenarios of one cluster against the in-memory API.
//!
//! The scenarios build on each other: the first node creates the firewall,
//! a second node joins, the first leaves and finally the last one leaves and
//! the firewall is reaped.

mod common;

use clusterfw::api::memory::InMemoryFirewallApi;
use clusterfw::api::FirewallApi;
use clusterfw::firewall::{
    attach_to_server, delete_if_orphaned, find_or_create, ProvisionRequest, ReapOutcome,
};
use clusterfw::labels::cluster_selector;
use clusterfw::model::{FirewallId, NodeAddress};
use clusterfw::rules::{is_internal, public_rules};
use common::{addr, coordinator, member_set, nets, CLUSTER_ID};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SERVER_1: u64 = 1001;
const SERVER_2: u64 = 1002;

fn request(address: NodeAddress) -> ProvisionRequest {
    ProvisionRequest {
        cluster_id: CLUSTER_ID.to_string(),
        name: None,
        initial_address: Some(address),
        populate_rules: true,
    }
}

/// Scenario A: the first node creates the firewall with itself as sole member.
async fn first_node_creates(api: &Arc<InMemoryFirewallApi>) -> FirewallId {
    let cancel = CancellationToken::new();
    let provisioned = find_or_create(api.as_ref(), &request(addr("10.0.0.1")), &cancel)
        .await
        .unwrap();
    assert!(provisioned.created);
    attach_to_server(api.as_ref(), &provisioned.firewall, SERVER_1, &cancel)
        .await
        .unwrap();
    provisioned.firewall.id
}

/// Scenario B: a second node finds the firewall and adds itself.
async fn second_node_joins(api: &Arc<InMemoryFirewallApi>) -> FirewallId {
    let cancel = CancellationToken::new();
    let provisioned = find_or_create(api.as_ref(), &request(addr("10.0.0.2")), &cancel)
        .await
        .unwrap();
    assert!(!provisioned.created);
    attach_to_server(api.as_ref(), &provisioned.firewall, SERVER_2, &cancel)
        .await
        .unwrap();
    coordinator(api, 2)
        .add(provisioned.firewall.id, addr("10.0.0.2"), &cancel)
        .await
        .unwrap();
    provisioned.firewall.id
}

/// Scenario C: the first node leaves; its server is deleted afterwards.
async fn first_node_leaves(api: &Arc<InMemoryFirewallApi>, id: FirewallId) {
    coordinator(api, 1)
        .remove(id, addr("10.0.0.1"), &CancellationToken::new())
        .await
        .unwrap();
    api.detach_server(id, SERVER_1);
}

#[tokio::test(start_paused = true)]
async fn scenario_a_first_node_creates_firewall() {
    let api = Arc::new(InMemoryFirewallApi::new());
    let id = first_node_creates(&api).await;

    assert_eq!(member_set(&api, id), nets(&["10.0.0.1"]));
    assert_eq!(api.calls().set_rules, 0, "no add for the creating node");

    let firewall = api.firewall(id).unwrap();
    assert_eq!(firewall.name, "rancher-demo");
    let public: Vec<_> = firewall.rules.iter().filter(|r| !is_internal(r)).cloned().collect();
    assert_eq!(public, public_rules());

    let listed = api.list_firewalls(&cluster_selector(CLUSTER_ID)).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_second_node_joins() {
    let api = Arc::new(InMemoryFirewallApi::new());
    let id = first_node_creates(&api).await;

    assert_eq!(second_node_joins(&api).await, id);
    assert_eq!(member_set(&api, id), nets(&["10.0.0.1", "10.0.0.2"]));
    assert_eq!(api.firewalls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_node_leaves() {
    let api = Arc::new(InMemoryFirewallApi::new());
    let id = first_node_creates(&api).await;
    second_node_joins(&api).await;

    first_node_leaves(&api, id).await;
    assert_eq!(member_set(&api, id), nets(&["10.0.0.2"]));

    let outcome = delete_if_orphaned(api.as_ref(), id, &CancellationToken::new()).await;
    assert_eq!(outcome, ReapOutcome::Kept { attached: 1 });
    assert!(api.firewall(id).is_some(), "still attached to the second server");
}

#[tokio::test(start_paused = true)]
async fn scenario_d_last_node_leaves() {
    let api = Arc::new(InMemoryFirewallApi::new());
    let cancel = CancellationToken::new();
    let id = first_node_creates(&api).await;
    second_node_joins(&api).await;
    first_node_leaves(&api, id).await;

    coordinator(&api, 2)
        .remove(id, addr("10.0.0.2"), &cancel)
        .await
        .unwrap();
    assert!(member_set(&api, id).is_empty());
    api.detach_server(id, SERVER_2);

    assert_eq!(
        delete_if_orphaned(api.as_ref(), id, &cancel).await,
        ReapOutcome::Deleted
    );
    assert!(api.firewalls().is_empty());
    assert_eq!(
        delete_if_orphaned(api.as_ref(), id, &cancel).await,
        ReapOutcome::AlreadyGone
    );
}

#[tokio::test(start_paused = true)]
async fn reaping_is_safe_while_attached() {
    let api = Arc::new(InMemoryFirewallApi::new());
    let id = first_node_creates(&api).await;

    let outcome = delete_if_orphaned(api.as_ref(), id, &CancellationToken::new()).await;
    assert_eq!(outcome, ReapOutcome::Kept { attached: 1 });
    assert_eq!(api.calls().delete, 0);
}
