// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for shared firewall coordination.
//!
//! This module provides:
//! - [`ApiError`] - a structured error returned by the cloud API, carrying the
//!   Hetzner error code so callers can branch on it without parsing strings
//! - [`FirewallError`] - the crate-wide error taxonomy
//!
//! Both types classify themselves as terminal or retriable. Terminal errors
//! (bad credentials, missing permissions, malformed input, missing resources)
//! never resolve by retrying, so membership updates abort on them immediately.
//! Everything else (conflicts, rate limiting, transient server errors, network
//! failures) is retried with backoff.

use crate::model::FirewallId;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes returned by the Hetzner Cloud API.
///
/// Only the codes this crate branches on are listed; anything else
/// deserializes to [`ErrorCode::Unknown`] and is treated as retriable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    TokenReadonly,
    InvalidInput,
    NotFound,
    Conflict,
    Locked,
    RateLimitExceeded,
    ResourceInUse,
    ResourceUnavailable,
    FirewallAlreadyApplied,
    UniquenessError,
    ServerError,
    ServiceError,
    Unavailable,
    Timeout,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    /// Wire representation of the code (e.g. `resource_in_use`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::TokenReadonly => "token_readonly",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Locked => "locked",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ResourceInUse => "resource_in_use",
            Self::ResourceUnavailable => "resource_unavailable",
            Self::FirewallAlreadyApplied => "firewall_already_applied",
            Self::UniquenessError => "uniqueness_error",
            Self::ServerError => "server_error",
            Self::ServiceError => "service_error",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true if an error with this code cannot succeed on retry.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Unauthorized
                | Self::Forbidden
                | Self::TokenReadonly
                | Self::InvalidInput
                | Self::NotFound
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by the cloud API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({code})")]
pub struct ApiError {
    /// Hetzner error code
    pub code: ErrorCode,
    /// Human-readable message from the API
    pub message: String,
    /// HTTP status of the response, when the error came from an HTTP call
    pub status: Option<u16>,
}

impl ApiError {
    /// Create an error that did not originate from an HTTP response
    /// (for example a failed asynchronous action).
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
        }
    }

    /// Attach the HTTP status the error was received with.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns true if retrying the request cannot succeed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.code.is_terminal()
    }
}

/// Membership operation performed by the node address coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipOp {
    Add,
    Remove,
}

impl MembershipOp {
    /// Lowercase name used in logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for MembershipOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crate-wide error type for shared firewall coordination.
#[derive(Error, Debug, Clone)]
pub enum FirewallError {
    /// Invalid operator-supplied configuration, detected before any remote call
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// More than one firewall carries the cluster's labels.
    ///
    /// This is ambiguous shared state that requires manual cleanup; it is never
    /// resolved automatically.
    #[error(
        "multiple shared firewalls found for selector {selector:?} (count={count}); \
         please delete or consolidate duplicates"
    )]
    DuplicateResource {
        /// Label selector that matched
        selector: String,
        /// Number of matching firewalls
        count: usize,
    },

    /// Error response from the cloud API
    #[error("cloud API error: {0}")]
    Api(#[from] ApiError),

    /// The request never produced an API response (connection, TLS, timeout)
    #[error("transport error talking to the cloud API: {0}")]
    Transport(String),

    /// The API responded with a body this crate could not decode
    #[error("failed to decode cloud API response: {0}")]
    Decode(String),

    /// A membership update did not observe its postcondition within the attempt budget
    #[error("failed to {operation} node address {address} after {attempts} attempts")]
    RetryExhausted {
        /// Operation that was retried
        operation: MembershipOp,
        /// Address being added or removed
        address: IpNet,
        /// Attempts performed
        attempts: u32,
    },

    /// Adding the address would exceed the per-rule address ceiling
    #[error(
        "firewall {firewall_id} already holds {limit} node addresses (the per-rule maximum); \
         cannot add {address}"
    )]
    MembershipLimit {
        /// Firewall being updated
        firewall_id: FirewallId,
        /// Configured ceiling
        limit: usize,
        /// Address that did not fit
        address: IpNet,
    },

    /// The firewall disappeared while it was being updated
    #[error("firewall {0} not found")]
    NotFound(FirewallId),

    /// A node address could not be parsed
    #[error("invalid node address {0:?}")]
    InvalidAddress(String),

    /// The operation was cancelled or its deadline expired
    #[error("operation cancelled before completion")]
    Cancelled,
}

impl FirewallError {
    /// Returns true if this error should not be retried.
    ///
    /// Only API errors with transient codes and transport failures are retriable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Api(api) => api.is_terminal(),
            Self::Transport(_) => false,
            Self::Configuration(_)
            | Self::DuplicateResource { .. }
            | Self::Decode(_)
            | Self::RetryExhausted { .. }
            | Self::MembershipLimit { .. }
            | Self::NotFound(_)
            | Self::InvalidAddress(_)
            | Self::Cancelled => true,
        }
    }

    /// Returns true if this is an API error carrying `code`.
    #[must_use]
    pub fn has_code(&self, code: ErrorCode) -> bool {
        matches!(self, Self::Api(api) if api.code == code)
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = FirewallError> = std::result::Result<T, E>;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
