// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry scheduling with jittered exponential backoff.
//!
//! Nodes of one cluster are often created at the same moment and would retry a
//! conflicting firewall update in lockstep. Every delay is therefore scaled by a
//! random factor in `[0.75, 1.25]`. The random source is injected so tests can
//! seed it.
//!
//! Every suspension point (backoff sleeps and remote calls) is raced against a
//! [`CancellationToken`]; deadlines are expressed as child tokens cancelled by a
//! timer (see [`deadline_token`]).

use crate::constants::{
    MAX_FIREWALL_RETRIES, RETRY_BACKOFF_MULTIPLIER, RETRY_BASE_DELAY_MILLIS, RETRY_JITTER_MAX,
    RETRY_JITTER_MIN, RETRY_MAX_DELAY_MILLIS,
};
use crate::errors::{FirewallError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff parameters of one retried operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Delay before the first retry
    #[serde(with = "millis")]
    pub base_delay: Duration,
    /// Exponential growth factor
    pub multiplier: f64,
    /// Ceiling applied before jitter
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MILLIS),
            multiplier: RETRY_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(RETRY_MAX_DELAY_MILLIS),
            max_attempts: MAX_FIREWALL_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay for `attempt`: `min(base * multiplier^attempt, cap)`.
    #[must_use]
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs > cap {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Computes jittered backoff delays and performs cancellable sleeps.
#[derive(Debug)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    rng: Mutex<StdRng>,
}

impl RetryScheduler {
    /// Scheduler seeded from the operating system.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_os_rng())
    }

    /// Scheduler using the given random source (deterministic when seeded).
    #[must_use]
    pub fn with_rng(policy: RetryPolicy, rng: StdRng) -> Self {
        Self {
            policy,
            rng: Mutex::new(rng),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay to wait before `attempt`, jittered by ±25%.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = {
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            rng.random_range(RETRY_JITTER_MIN..=RETRY_JITTER_MAX)
        };
        self.policy.ceiling(attempt).mul_f64(factor)
    }

    /// Sleep for `delay` unless `cancel` fires first.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::Cancelled`] if the token is cancelled before
    /// the delay elapses.
    pub async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            () = cancel.cancelled() => Err(FirewallError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Run a remote call unless `cancel` fires first.
///
/// The in-flight future is dropped on cancellation.
///
/// # Errors
///
/// Returns the call's own error, or [`FirewallError::Cancelled`].
pub async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FirewallError::Cancelled),
        result = call => result,
    }
}

/// Child of `parent` that is additionally cancelled once `timeout` elapses.
///
/// Must be called from within a Tokio runtime.
#[must_use]
pub fn deadline_token(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let child = parent.child_token();
    let timer = child.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = timer.cancelled() => {}
            () = tokio::time::sleep(timeout) => timer.cancel(),
        }
    });
    child
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
