//! Exponential reconnect backoff for the socket client.

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{info, warn};

pub const RECONNECT_FAILED: &str = "Failed to connect after multiple attempts";

/// Retry schedule: attempt `n` (1-based) waits `2^n` seconds.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base: Duration,
    attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReconnectPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base: Duration::from_secs(1),
            attempts: 0,
        }
    }

    /// Scales every delay; tests use milliseconds.
    #[must_use]
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.base * 2u32.saturating_pow(self.attempts))
    }

    /// Called after a successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Calls `connect` until it succeeds, sleeping per `policy` between tries.
///
/// # Errors
/// Fails with [`RECONNECT_FAILED`] once the policy is exhausted.
pub async fn connect_with_backoff<T, F, Fut>(policy: &mut ReconnectPolicy, mut connect: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    loop {
        match connect().await {
            Ok(conn) => {
                policy.reset();
                return Ok(conn);
            }
            Err(e) => {
                let Some(delay) = policy.next_delay() else {
                    warn!(error = %format!("{e:#}"), "giving up on reconnect");
                    bail!(RECONNECT_FAILED);
                };
                info!(
                    attempt = policy.attempts(),
                    max = policy.max_attempts(),
                    delay_secs = delay.as_secs_f64(),
                    error = %format!("{e:#}"),
                    "connect failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
