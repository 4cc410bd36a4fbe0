// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hetzner Cloud HTTP backend of [`crate::api::FirewallApi`].
//!
//! [`HcloudClient`] talks to the `/firewalls` and `/actions` endpoints of the
//! Hetzner Cloud API with a bearer token. Error bodies are decoded into
//! [`crate::errors::ApiError`]; responses without one are classified by their
//! HTTP status (see [`crate::http_errors`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use clusterfw::api::FirewallApi;
//! use clusterfw::config::Settings;
//! use clusterfw::hcloud::HcloudClient;
//!
//! # async fn example() -> clusterfw::errors::Result<()> {
//! let client = HcloudClient::new("my-token", &Settings::default())?;
//! let firewalls = client.list_firewalls("cluster=demo").await?;
//! println!("{} firewalls", firewalls.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
mod types;

pub use client::HcloudClient;
