// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Request and response envelopes of the Hetzner Cloud API.

use crate::errors::ErrorCode;
use crate::model::{Action, AppliedResource, Firewall, FirewallRule};
use serde::{Deserialize, Serialize};

/// `{"error": {...}}` body of a failed request.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Meta {
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default)]
    pub next_page: Option<u32>,
}

/// `GET /firewalls`
#[derive(Debug, Deserialize)]
pub(crate) struct ListFirewallsResponse {
    pub firewalls: Vec<Firewall>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

impl ListFirewallsResponse {
    pub fn next_page(&self) -> Option<u32> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.pagination.as_ref())
            .and_then(|pagination| pagination.next_page)
    }
}

/// `GET /firewalls/{id}`
#[derive(Debug, Deserialize)]
pub(crate) struct FirewallResponse {
    pub firewall: Firewall,
}

/// `POST /firewalls`
#[derive(Debug, Deserialize)]
pub(crate) struct CreateFirewallResponse {
    pub firewall: Firewall,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Responses of `POST /firewalls/{id}/actions/*`
#[derive(Debug, Deserialize)]
pub(crate) struct ActionsResponse {
    pub actions: Vec<Action>,
}

/// `GET /actions/{id}`
#[derive(Debug, Deserialize)]
pub(crate) struct ActionResponse {
    pub action: Action,
}

/// `POST /firewalls/{id}/actions/set_rules`
#[derive(Debug, Serialize)]
pub(crate) struct SetRulesRequest<'a> {
    pub rules: &'a [FirewallRule],
}

/// `POST /firewalls/{id}/actions/apply_to_resources`
#[derive(Debug, Serialize)]
pub(crate) struct ApplyToResourcesRequest {
    pub apply_to: Vec<AppliedResource>,
}
