// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Compare-and-retry over a remote resource.
//!
//! [`converge`] drives a resource towards a [`Postcondition`] with a
//! read-modify-verify loop:
//!
//! 1. read the current state
//! 2. stop if the postcondition already holds
//! 3. compute and submit the next state
//! 4. re-read and check the postcondition, retrying with backoff if a
//!    concurrent writer overwrote the change
//!
//! The loop only relies on [`CasResource::read`] and [`CasResource::write`].
//! `write` receives the state the update was computed from, so a resource whose
//! API supports conditional updates (an entity version or ETag) can reject a
//! stale write itself; resources without one, like Hetzner firewalls, ignore it
//! and rely on the verification read.

use crate::errors::{FirewallError, Result};
use crate::retry::RetryScheduler;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A remote resource updated by full replacement.
#[async_trait]
pub trait CasResource: Send + Sync {
    type State: Send + Sync;

    /// Current state, or `None` if the resource does not exist.
    async fn read(&self, cancel: &CancellationToken) -> Result<Option<Self::State>>;

    /// Replace the resource's state with `next`, computed from `expected`.
    ///
    /// Returns once the replacement is complete on the remote side.
    async fn write(
        &self,
        expected: &Self::State,
        next: &Self::State,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// The condition [`converge`] establishes.
pub trait Postcondition<S> {
    fn holds(&self, state: &S) -> bool;

    /// The state to submit when the condition does not hold in `current`.
    ///
    /// # Errors
    ///
    /// An error aborts the loop without writing.
    fn next(&self, current: &S) -> Result<S>;
}

/// How a [`converge`] call ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The postcondition was observed to hold
    Held { attempts: u32, submissions: u32 },
    /// The resource does not exist
    Missing { attempts: u32, submissions: u32 },
    /// The attempt budget ran out before the postcondition was observed
    Exhausted { attempts: u32, submissions: u32 },
}

impl Outcome {
    /// Attempts made, including the first.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match *self {
            Self::Held { attempts, .. }
            | Self::Missing { attempts, .. }
            | Self::Exhausted { attempts, .. } => attempts,
        }
    }

    /// Writes submitted.
    #[must_use]
    pub fn submissions(&self) -> u32 {
        match *self {
            Self::Held { submissions, .. }
            | Self::Missing { submissions, .. }
            | Self::Exhausted { submissions, .. } => submissions,
        }
    }
}

/// Drive `resource` until `goal` holds, up to the scheduler's attempt budget.
///
/// Backoff sleeps precede every attempt after the first. Terminal read and
/// write errors abort immediately; transient ones move on to the next attempt.
/// A failed verification read also moves on to the next attempt.
///
/// `description` names the operation in log messages.
///
/// # Errors
///
/// - Terminal errors from reading or writing the resource
/// - Errors from [`Postcondition::next`]
/// - [`FirewallError::Cancelled`] if `cancel` fires during a sleep or a call
pub async fn converge<R, G>(
    resource: &R,
    goal: &G,
    scheduler: &RetryScheduler,
    cancel: &CancellationToken,
    description: &str,
) -> Result<Outcome>
where
    R: CasResource + ?Sized,
    G: Postcondition<R::State> + ?Sized,
{
    let max_attempts = scheduler.policy().max_attempts.max(1);
    let mut submissions = 0;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = scheduler.delay(attempt);
            info!(
                "Retry {}/{}: waiting {:?} before trying to {} again",
                attempt, max_attempts, delay, description
            );
            scheduler.sleep(delay, cancel).await?;
        }
        let attempts = attempt + 1;

        let current = match resource.read(cancel).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                return Ok(Outcome::Missing {
                    attempts,
                    submissions,
                })
            }
            Err(err) if err.is_terminal() => return Err(err),
            Err(err) => {
                warn!(
                    "Failed to read state before trying to {} (attempt {}): {}",
                    description, attempts, err
                );
                continue;
            }
        };

        if goal.holds(&current) {
            debug!("'{}' already satisfied", description);
            return Ok(Outcome::Held {
                attempts,
                submissions,
            });
        }

        let next = goal.next(&current)?;
        submissions += 1;
        match resource.write(&current, &next, cancel).await {
            Ok(()) => {}
            Err(err) if err.is_terminal() => return Err(err),
            Err(err) => {
                warn!(
                    "Failed to {} (attempt {}): {}",
                    description, attempts, err
                );
                continue;
            }
        }

        match resource.read(cancel).await {
            Ok(Some(state)) if goal.holds(&state) => {
                return Ok(Outcome::Held {
                    attempts,
                    submissions,
                })
            }
            Ok(Some(_)) => warn!(
                "Result of '{}' not observed after update (attempt {}), retrying",
                description, attempts
            ),
            Ok(None) => {
                return Ok(Outcome::Missing {
                    attempts,
                    submissions,
                })
            }
            Err(FirewallError::Cancelled) => return Err(FirewallError::Cancelled),
            Err(err) => warn!(
                "Failed to verify '{}' (attempt {}): {}",
                description, attempts, err
            ),
        }
    }

    Ok(Outcome::Exhausted {
        attempts: max_attempts,
        submissions,
    })
}

#[cfg(test)]
#[path = "cas_tests.rs"]
mod cas_tests;
