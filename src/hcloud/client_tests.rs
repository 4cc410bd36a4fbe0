// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the Hetzner Cloud client

#[cfg(test)]
mod tests {
    use super::super::HcloudClient;
    use crate::api::{CreateFirewallRequest, FirewallApi};
    use crate::config::Settings;
    use crate::errors::{ErrorCode, FirewallError};
    use crate::model::{Action, ActionStatus, AppliedResource, Direction, Protocol};
    use crate::rules::public_rules;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HcloudClient {
        let settings = Settings {
            api_endpoint: format!("{}/v1", server.uri()),
            action_poll_interval_millis: 5,
            ..Settings::default()
        };
        HcloudClient::new("test-token", &settings).unwrap()
    }

    fn firewall_json(id: u64, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "labels": {"managed-by": "rancher-machine", "cluster": "demo"},
            "rules": [{
                "direction": "in",
                "protocol": "tcp",
                "port": "22",
                "source_ips": ["0.0.0.0/0", "::/0"],
                "destination_ips": [],
                "description": "SSH"
            }],
            "applied_to": [
                {"type": "server", "server": {"id": 42}},
                {"type": "label_selector", "label_selector": {"selector": "env=prod"},
                 "applied_to_resources": []}
            ],
            "created": "2025-01-30T23:55:00+00:00"
        })
    }

    fn action_json(id: u64, status: &str) -> serde_json::Value {
        let progress = if status == "running" { 50 } else { 100 };
        json!({
            "id": id,
            "command": "set_firewall_rules",
            "status": status,
            "progress": progress,
            "started": "2025-01-30T23:55:00+00:00",
            "finished": null,
            "error": null
        })
    }

    fn running_action(id: u64) -> Action {
        serde_json::from_value(action_json(id, "running")).unwrap()
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = HcloudClient::new("  ", &Settings::default()).unwrap_err();
        assert!(matches!(err, FirewallError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_list_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/firewalls"))
            .and(query_param("label_selector", "managed-by=rancher-machine,cluster=demo"))
            .and(query_param("page", "1"))
            .and(query_param("per_page", "50"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "firewalls": [firewall_json(1, "rancher-demo")],
                "meta": {"pagination": {"page": 1, "per_page": 50, "next_page": 2}}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/firewalls"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "firewalls": [firewall_json(2, "rancher-demo-old")],
                "meta": {"pagination": {"page": 2, "per_page": 50, "next_page": null}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let firewalls = client(&server)
            .list_firewalls("managed-by=rancher-machine,cluster=demo")
            .await
            .unwrap();
        assert_eq!(
            firewalls.iter().map(|fw| fw.id).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let first = &firewalls[0];
        assert_eq!(first.labels.get("cluster").map(String::as_str), Some("demo"));
        assert_eq!(first.rules[0].direction, Direction::In);
        assert_eq!(first.rules[0].protocol, Protocol::Tcp);
        assert_eq!(first.rules[0].source_ips.len(), 2);
        assert_eq!(first.applied_to[0], AppliedResource::server(42));
        assert!(matches!(
            first.applied_to[1],
            AppliedResource::LabelSelector { .. }
        ));
    }

    #[tokio::test]
    async fn test_list_without_meta_is_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/firewalls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"firewalls": []})))
            .expect(1)
            .mount(&server)
            .await;

        let firewalls = client(&server).list_firewalls("cluster=demo").await.unwrap();
        assert!(firewalls.is_empty());
    }

    #[tokio::test]
    async fn test_get_firewall() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/firewalls/7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"firewall": firewall_json(7, "rancher-demo")})),
            )
            .mount(&server)
            .await;

        let firewall = client(&server).get_firewall(7).await.unwrap().unwrap();
        assert_eq!(firewall.name, "rancher-demo");
        assert!(firewall.created.is_some());
    }

    #[tokio::test]
    async fn test_get_missing_firewall_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/firewalls/7"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "not_found", "message": "firewall with ID '7' not found"}
            })))
            .mount(&server)
            .await;

        assert!(client(&server).get_firewall(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_body_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/firewalls/7/actions/set_rules"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": "token_readonly", "message": "token is read-only"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).set_rules(7, &[]).await.unwrap_err();
        match err {
            FirewallError::Api(api) => {
                assert_eq!(api.code, ErrorCode::TokenReadonly);
                assert_eq!(api.message, "token is read-only");
                assert_eq!(api.status, Some(403));
            }
            other => panic!("expected an API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_error_code_is_retriable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/firewalls/7"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {"code": "brand_new_code", "message": "something new"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_firewall(7).await.unwrap_err();
        assert!(err.has_code(ErrorCode::Unknown));
        assert!(!err.is_terminal());
    }

    #[tokio::test]
    async fn test_error_without_body_uses_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/firewalls/7"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = client(&server).get_firewall(7).await.unwrap_err();
        assert!(err.has_code(ErrorCode::Unavailable));
        assert!(!err.is_terminal());
    }

    #[tokio::test]
    async fn test_undecodable_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/firewalls/7"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"unexpected\": true}"))
            .mount(&server)
            .await;

        let err = client(&server).get_firewall(7).await.unwrap_err();
        assert!(matches!(err, FirewallError::Decode(_)));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        // Nothing listens on a port released right after binding
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let settings = Settings {
            api_endpoint: format!("http://127.0.0.1:{port}/v1"),
            ..Settings::default()
        };
        let client = HcloudClient::new("test-token", &settings).unwrap();

        let err = client.get_firewall(7).await.unwrap_err();
        assert!(matches!(err, FirewallError::Transport(_)), "{err:?}");
        assert!(!err.is_terminal());
    }

    #[tokio::test]
    async fn test_create_firewall() {
        let server = MockServer::start().await;
        let labels = BTreeMap::from([("cluster".to_string(), "demo".to_string())]);
        let request = CreateFirewallRequest {
            name: "rancher-demo".into(),
            labels: labels.clone(),
            rules: public_rules(),
        };
        Mock::given(method("POST"))
            .and(path("/v1/firewalls"))
            .and(body_json(serde_json::to_value(&request).unwrap()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "firewall": firewall_json(9, "rancher-demo"),
                "actions": [action_json(100, "running")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server).create_firewall(&request).await.unwrap();
        assert_eq!(created.firewall.id, 9);
        assert_eq!(created.actions.len(), 1);
        assert_eq!(created.actions[0].status, ActionStatus::Running);
    }

    #[tokio::test]
    async fn test_set_rules_sends_rule_list() {
        let server = MockServer::start().await;
        let rules = public_rules();
        Mock::given(method("POST"))
            .and(path("/v1/firewalls/7/actions/set_rules"))
            .and(body_json(json!({"rules": serde_json::to_value(&rules).unwrap()})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "actions": [action_json(101, "running"), action_json(102, "success")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let actions = client(&server).set_rules(7, &rules).await.unwrap();
        assert_eq!(actions.iter().map(|a| a.id).collect::<Vec<_>>(), vec![101, 102]);
    }

    #[tokio::test]
    async fn test_apply_to_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/firewalls/7/actions/apply_to_resources"))
            .and(body_json(json!({
                "apply_to": [{"type": "server", "server": {"id": 42}}]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "actions": [action_json(103, "running")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let actions = client(&server).apply_to_server(7, 42).await.unwrap();
        assert_eq!(actions.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_firewall() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/firewalls/7"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete_firewall(7).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_in_use_firewall() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/firewalls/7"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "error": {"code": "resource_in_use", "message": "firewall is still in use"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).delete_firewall(7).await.unwrap_err();
        assert!(err.has_code(ErrorCode::ResourceInUse));
    }

    #[tokio::test]
    async fn test_wait_for_action_polls_until_finished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/actions/100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"action": action_json(100, "running")})),
            )
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/actions/100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"action": action_json(100, "success")})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .wait_for_action(&running_action(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_finished_action_does_not_poll() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let action: Action = serde_json::from_value(action_json(100, "success")).unwrap();
        client(&server).wait_for_action(&action).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_failed_action() {
        let server = MockServer::start().await;
        let mut failed = action_json(100, "error");
        failed["error"] = json!({"code": "server_error", "message": "rules could not be applied"});
        Mock::given(method("GET"))
            .and(path("/v1/actions/100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"action": failed})))
            .mount(&server)
            .await;

        let err = client(&server)
            .wait_for_action(&running_action(100))
            .await
            .unwrap_err();
        assert!(err.has_code(ErrorCode::ServerError));
    }
}
