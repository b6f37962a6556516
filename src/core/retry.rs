//! Retry on store contention
//!
//! Writes that hit SQLITE_BUSY / SQLITE_LOCKED are retried with exponential
//! backoff plus jitter. Waiting goes through [`Sleeper`] so tests can swap in
//! a fake clock. Reads never go through here.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use super::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Cap on any single wait, jitter included
    pub max_delay: Duration,
    /// Add up to half the backoff again at random
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(2_000),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    /// Backoff with jitter applied, still capped at `max_delay`.
    pub fn delay(&self, retry: u32) -> Duration {
        let backoff = self.backoff(retry);
        if !self.jitter {
            return backoff;
        }
        let spread = backoff.as_millis() as u64 / 2;
        let extra = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        (backoff + Duration::from_millis(extra)).min(self.max_delay)
    }
}

/// Source of waiting
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleep
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Runs write operations under a [`RetryPolicy`]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper + Send + Sync>,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, ThreadSleeper)
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: impl Sleeper + Send + Sync + 'static) -> Self {
        Self {
            policy,
            sleeper: Box::new(sleeper),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, retrying only contention errors.
    ///
    /// `context` names the slot or operation and ends up in the final
    /// [`Error::Contention`] when attempts run out.
    pub fn run<T>(&self, context: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_contention() => {
                    if attempt >= max_attempts {
                        return Err(match err {
                            Error::Database(source) => Error::Contention {
                                context: context.to_string(),
                                attempts: attempt,
                                source,
                            },
                            other => other,
                        });
                    }
                    let delay = self.policy.delay(attempt);
                    warn!(
                        context,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "store busy, retrying"
                    );
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
