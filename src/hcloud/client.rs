// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! reqwest-based Hetzner Cloud API client.

use super::types::{
    ActionResponse, ActionsResponse, ApplyToResourcesRequest, CreateFirewallResponse,
    ErrorResponse, FirewallResponse, ListFirewallsResponse, SetRulesRequest,
};
use crate::api::{CreateFirewallRequest, CreatedFirewall, FirewallApi};
use crate::config::Settings;
use crate::constants::{HTTP_REQUEST_TIMEOUT_SECS, LIST_PAGE_SIZE};
use crate::errors::{ApiError, ErrorCode, FirewallError, Result};
use crate::http_errors::api_error_from_status;
use crate::model::{
    Action, ActionId, ActionStatus, AppliedResource, Firewall, FirewallId, FirewallRule, ServerId,
};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Hetzner Cloud API client.
#[derive(Clone)]
pub struct HcloudClient {
    client: HttpClient,
    base_url: Url,
    token: String,
    poll_interval: Duration,
}

impl fmt::Debug for HcloudClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HcloudClient")
            .field("base_url", &self.base_url.as_str())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Decode the error body of a failed request, falling back to the status.
fn error_from_response(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(response) => {
            ApiError::new(response.error.code, response.error.message).with_status(status)
        }
        Err(_) => api_error_from_status(status),
    }
}

impl HcloudClient {
    /// Build a client for the endpoint and polling interval of `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::Configuration`] if the token is empty, the
    /// endpoint is not a valid base URL, or the HTTP client cannot be built.
    pub fn new(token: impl Into<String>, settings: &Settings) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(FirewallError::Configuration(
                "a Hetzner Cloud API token is required".into(),
            ));
        }
        let base_url = Url::parse(&settings.api_endpoint).map_err(|e| {
            FirewallError::Configuration(format!("apiEndpoint {:?}: {e}", settings.api_endpoint))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(FirewallError::Configuration(format!(
                "apiEndpoint {:?} is not a base URL",
                settings.api_endpoint
            )));
        }

        let client = HttpClient::builder()
            .user_agent(concat!("clusterfw/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FirewallError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
            poll_interval: settings.action_poll_interval(),
        })
    }

    /// Endpoint URL below the API base.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                FirewallError::Configuration(format!("{} is not a base URL", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send an authenticated request and return the body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let request = request
            .bearer_auth(&self.token)
            .build()
            .map_err(|e| FirewallError::Transport(e.to_string()))?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(method = %method, url = %url, "Cloud API request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| FirewallError::Transport(format!("{method} {url}: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FirewallError::Transport(format!("{method} {url}: {e}")))?;

        if !status.is_success() {
            let err = error_from_response(status.as_u16(), &body);
            debug!(
                method = %method,
                url = %url,
                status = %status,
                code = %err.code,
                "Cloud API request failed"
            );
            return Err(err.into());
        }
        debug!(
            method = %method,
            url = %url,
            status = %status,
            response_len = body.len(),
            "Cloud API request successful"
        );
        Ok(body)
    }

    /// Send a request and decode its JSON response.
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| FirewallError::Decode(e.to_string()))
    }

    async fn get_action(&self, id: ActionId) -> Result<Action> {
        let url = self.url(&["actions", &id.to_string()])?;
        let response: ActionResponse = self.call(self.client.get(url)).await?;
        Ok(response.action)
    }
}

#[async_trait]
impl FirewallApi for HcloudClient {
    async fn list_firewalls(&self, label_selector: &str) -> Result<Vec<Firewall>> {
        let mut firewalls = Vec::new();
        let mut page = 1;
        loop {
            let mut url = self.url(&["firewalls"])?;
            {
                let mut query = url.query_pairs_mut();
                if !label_selector.is_empty() {
                    query.append_pair("label_selector", label_selector);
                }
                query
                    .append_pair("page", &page.to_string())
                    .append_pair("per_page", &LIST_PAGE_SIZE.to_string());
            }
            let response: ListFirewallsResponse = self.call(self.client.get(url)).await?;
            let next_page = response.next_page();
            firewalls.extend(response.firewalls);

            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        debug!(
            label_selector = %label_selector,
            count = firewalls.len(),
            "Listed firewalls"
        );
        Ok(firewalls)
    }

    async fn get_firewall(&self, id: FirewallId) -> Result<Option<Firewall>> {
        let url = self.url(&["firewalls", &id.to_string()])?;
        match self.call::<FirewallResponse>(self.client.get(url)).await {
            Ok(response) => Ok(Some(response.firewall)),
            Err(err) if err.has_code(ErrorCode::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_firewall(&self, request: &CreateFirewallRequest) -> Result<CreatedFirewall> {
        let url = self.url(&["firewalls"])?;
        let response: CreateFirewallResponse =
            self.call(self.client.post(url).json(request)).await?;
        Ok(CreatedFirewall {
            firewall: response.firewall,
            actions: response.actions,
        })
    }

    async fn set_rules(&self, id: FirewallId, rules: &[FirewallRule]) -> Result<Vec<Action>> {
        let url = self.url(&["firewalls", &id.to_string(), "actions", "set_rules"])?;
        let response: ActionsResponse = self
            .call(self.client.post(url).json(&SetRulesRequest { rules }))
            .await?;
        Ok(response.actions)
    }

    async fn apply_to_server(&self, id: FirewallId, server_id: ServerId) -> Result<Vec<Action>> {
        let url = self.url(&["firewalls", &id.to_string(), "actions", "apply_to_resources"])?;
        let body = ApplyToResourcesRequest {
            apply_to: vec![AppliedResource::server(server_id)],
        };
        let response: ActionsResponse = self.call(self.client.post(url).json(&body)).await?;
        Ok(response.actions)
    }

    async fn delete_firewall(&self, id: FirewallId) -> Result<()> {
        let url = self.url(&["firewalls", &id.to_string()])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn wait_for_action(&self, action: &Action) -> Result<()> {
        let mut current = action.clone();
        while !current.is_finished() {
            tokio::time::sleep(self.poll_interval).await;
            current = self.get_action(current.id).await?;
            debug!(
                action_id = current.id,
                command = %current.command,
                progress = current.progress,
                "Polled action"
            );
        }

        match (current.status, current.error) {
            (ActionStatus::Error, Some(err)) => Err(ApiError::new(err.code, err.message).into()),
            (ActionStatus::Error, None) => Err(ApiError::new(
                ErrorCode::Unknown,
                format!("action {} ({}) failed", current.id, current.command),
            )
            .into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
