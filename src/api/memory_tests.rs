// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `memory.rs`

#[cfg(test)]
mod tests {
    use super::super::{matches_selector, ApiCall, InMemoryFirewallApi};
    use crate::api::{CreateFirewallRequest, FirewallApi};
    use crate::errors::{ApiError, ErrorCode};
    use crate::labels::{cluster_selector, firewall_labels};
    use crate::rules::public_rules;
    use std::collections::BTreeMap;

    fn request(cluster: &str) -> CreateFirewallRequest {
        CreateFirewallRequest {
            name: format!("rancher-{cluster}"),
            labels: firewall_labels(cluster),
            rules: public_rules(),
        }
    }

    #[test]
    fn test_matches_selector() {
        let labels = firewall_labels("demo");
        assert!(matches_selector(&labels, &cluster_selector("demo")));
        assert!(!matches_selector(&labels, &cluster_selector("other")));
        assert!(matches_selector(&labels, "cluster"));
        assert!(!matches_selector(&labels, "missing"));
        assert!(matches_selector(&labels, ""));
        assert!(!matches_selector(&BTreeMap::new(), "cluster=demo"));
    }

    #[tokio::test]
    async fn test_create_then_list_by_selector() {
        let api = InMemoryFirewallApi::new();
        let created = api.create_firewall(&request("demo")).await.unwrap();
        assert_eq!(created.actions.len(), 1);
        api.create_firewall(&request("other")).await.unwrap();

        let found = api.list_firewalls(&cluster_selector("demo")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, created.firewall.id);
    }

    #[tokio::test]
    async fn test_create_duplicate_name_fails() {
        let api = InMemoryFirewallApi::new();
        api.create_firewall(&request("demo")).await.unwrap();
        let err = api.create_firewall(&request("demo")).await.unwrap_err();
        assert!(err.has_code(ErrorCode::UniquenessError));
    }

    #[tokio::test]
    async fn test_race_next_create_stores_winner() {
        let api = InMemoryFirewallApi::new();
        api.race_next_create();
        let err = api.create_firewall(&request("demo")).await.unwrap_err();
        assert!(err.has_code(ErrorCode::UniquenessError));
        assert_eq!(api.firewalls().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_update_is_acknowledged_but_not_applied() {
        let api = InMemoryFirewallApi::new();
        let id = api.insert_firewall("fw", BTreeMap::new(), Vec::new());
        api.lose_next_updates(1);

        let actions = api.set_rules(id, &public_rules()).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert!(api.firewall(id).unwrap().rules.is_empty());

        api.set_rules(id, &public_rules()).await.unwrap();
        assert_eq!(api.firewall(id).unwrap().rules, public_rules());
        assert_eq!(api.calls().set_rules, 2);
    }

    #[tokio::test]
    async fn test_set_rules_on_missing_firewall() {
        let api = InMemoryFirewallApi::new();
        let err = api.set_rules(42, &[]).await.unwrap_err();
        assert!(err.has_code(ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn test_delete_refused_while_attached() {
        let api = InMemoryFirewallApi::new();
        let id = api.insert_firewall("fw", BTreeMap::new(), Vec::new());
        api.apply_to_server(id, 7).await.unwrap();

        let err = api.delete_firewall(id).await.unwrap_err();
        assert!(err.has_code(ErrorCode::ResourceInUse));

        api.detach_server(id, 7);
        api.delete_firewall(id).await.unwrap();
        assert!(api.get_firewall(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_twice_reports_already_applied() {
        let api = InMemoryFirewallApi::new();
        let id = api.insert_firewall("fw", BTreeMap::new(), Vec::new());
        api.apply_to_server(id, 7).await.unwrap();
        let err = api.apply_to_server(id, 7).await.unwrap_err();
        assert!(err.has_code(ErrorCode::FirewallAlreadyApplied));
        assert_eq!(api.firewall(id).unwrap().applied_to.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_queue_per_call() {
        let api = InMemoryFirewallApi::new();
        api.fail_next(ApiCall::List, ApiError::new(ErrorCode::RateLimitExceeded, "slow down"));
        api.fail_next(ApiCall::List, ApiError::new(ErrorCode::Unauthorized, "bad token"));

        let first = api.list_firewalls("").await.unwrap_err();
        assert!(first.has_code(ErrorCode::RateLimitExceeded));
        let second = api.list_firewalls("").await.unwrap_err();
        assert!(second.has_code(ErrorCode::Unauthorized));
        assert!(api.list_firewalls("").await.is_ok());
        assert_eq!(api.calls().list, 3);
    }

    #[tokio::test]
    async fn test_failed_actions_surface_on_wait() {
        let api = InMemoryFirewallApi::new();
        let id = api.insert_firewall("fw", BTreeMap::new(), Vec::new());
        api.fail_next_actions(1);

        let actions = api.set_rules(id, &public_rules()).await.unwrap();
        let err = api.wait_for_action(&actions[0]).await.unwrap_err();
        assert!(err.has_code(ErrorCode::ServerError));

        let actions = api.set_rules(id, &public_rules()).await.unwrap();
        assert!(api.wait_for_action(&actions[0]).await.is_ok());
    }
}
