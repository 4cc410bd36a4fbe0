// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP status code mapping to cloud API error codes.
//!
//! The Hetzner Cloud API normally reports failures as a JSON body of the form
//! `{"error": {"code": "...", "message": "..."}}`. Proxies and load balancers in
//! front of the API do not, so when the body cannot be decoded the HTTP status
//! alone decides how the failure is classified.
//!
//! # Usage
//!
//! ```rust
//! use clusterfw::errors::ErrorCode;
//! use clusterfw::http_errors::map_http_status_to_code;
//!
//! let (code, message) = map_http_status_to_code(404);
//! assert_eq!(code, ErrorCode::NotFound);
//!
//! let (code, message) = map_http_status_to_code(503);
//! assert_eq!(code, ErrorCode::Unavailable);
//! ```

use crate::errors::{ApiError, ErrorCode};

/// Map an HTTP status code to an API error code and message.
///
/// # HTTP Code Mapping
///
/// | HTTP Code | Code | Retriable |
/// |-----------|------|-----------|
/// | 400 | `invalid_input` | no |
/// | 401 | `unauthorized` | no |
/// | 403 | `forbidden` | no |
/// | 404 | `not_found` | no |
/// | 409 | `conflict` | yes |
/// | 422 | `invalid_input` | no |
/// | 423 | `locked` | yes |
/// | 429 | `rate_limit_exceeded` | yes |
/// | 503 | `unavailable` | yes |
/// | 504 | `timeout` | yes |
/// | other 5xx | `server_error` | yes |
/// | Other | `unknown` | yes |
#[must_use]
pub fn map_http_status_to_code(status_code: u16) -> (ErrorCode, String) {
    match status_code {
        400 | 422 => (
            ErrorCode::InvalidInput,
            format!("Invalid request to cloud API ({status_code})"),
        ),
        401 => (
            ErrorCode::Unauthorized,
            "Cloud API authentication required (401)".into(),
        ),
        403 => (
            ErrorCode::Forbidden,
            "Cloud API authorization failed (403)".into(),
        ),
        404 => (ErrorCode::NotFound, "Resource not found (404)".into()),
        409 => (
            ErrorCode::Conflict,
            "Conflicting concurrent modification (409)".into(),
        ),
        423 => (ErrorCode::Locked, "Resource is locked (423)".into()),
        429 => (
            ErrorCode::RateLimitExceeded,
            "Cloud API rate limit exceeded (429)".into(),
        ),
        503 => (
            ErrorCode::Unavailable,
            "Cloud API service unavailable (503)".into(),
        ),
        504 => (
            ErrorCode::Timeout,
            "Gateway timeout reaching cloud API (504)".into(),
        ),
        500..=599 => (
            ErrorCode::ServerError,
            format!("Cloud API internal error ({status_code})"),
        ),
        _ => (
            ErrorCode::Unknown,
            format!("Unexpected HTTP response from cloud API ({status_code})"),
        ),
    }
}

/// Build an [`ApiError`] from an HTTP status when the response carried no
/// decodable error body.
#[must_use]
pub fn api_error_from_status(status_code: u16) -> ApiError {
    let (code, message) = map_http_status_to_code(status_code);
    ApiError::new(code, message).with_status(status_code)
}
