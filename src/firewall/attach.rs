// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Apply the shared firewall to a server.

use crate::api::{wait_for_actions, FirewallApi};
use crate::errors::{ErrorCode, Result};
use crate::model::{Firewall, ServerId};
use crate::retry::cancellable;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Attach `firewall` to `server_id`.
///
/// Attaching a firewall that is already applied to the server succeeds.
///
/// # Errors
///
/// Returns the API error of the apply call, or the error of the first apply
/// action that failed.
pub async fn attach_to_server(
    api: &dyn FirewallApi,
    firewall: &Firewall,
    server_id: ServerId,
    cancel: &CancellationToken,
) -> Result<()> {
    let actions = match cancellable(cancel, api.apply_to_server(firewall.id, server_id)).await {
        Ok(actions) => actions,
        Err(err) if err.has_code(ErrorCode::FirewallAlreadyApplied) => {
            info!(
                "Firewall {:?} already applied to server {}",
                firewall.name, server_id
            );
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    if let Some((_, err)) = wait_for_actions(api, &actions, cancel)
        .await?
        .into_iter()
        .next()
    {
        return Err(err);
    }

    info!("Firewall {:?} attached to server {}", firewall.name, server_id);
    Ok(())
}
