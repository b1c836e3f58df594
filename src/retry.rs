//! Retry policy for chain operations
//!
//! Delays come from `backoff::ExponentialBackoff`: each failed attempt waits
//! about `initial * multiplier^attempt` (with 10% jitter), capped at
//! `max_interval`, before the same operation runs again with the same
//! arguments. With `max_attempts = None` and no `max_elapsed_ms` the
//! operation is retried forever.

use backoff::backoff::Backoff as _;
use backoff::ExponentialBackoff;
use serde::Deserialize;
use std::time::Duration;

const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub initial_interval_ms: u64,
    pub multiplier: u32,
    pub max_interval_ms: u64,
    /// Total attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first failure
    pub max_elapsed_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            multiplier: 2,
            max_interval_ms: 30_000,
            max_attempts: Some(16),
            max_elapsed_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps. Used by tests and local dev chains.
    pub fn immediate(max_attempts: Option<u32>) -> Self {
        Self {
            initial_interval_ms: 0,
            multiplier: 1,
            max_interval_ms: 0,
            max_attempts,
            max_elapsed_ms: None,
        }
    }

    /// Start tracking attempts for one operation.
    pub fn start(&self) -> Backoff {
        let initial = Duration::from_millis(self.initial_interval_ms);
        let mut exponential = ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            randomization_factor: RANDOMIZATION_FACTOR,
            multiplier: f64::from(self.multiplier.max(1)),
            max_interval: Duration::from_millis(self.max_interval_ms.max(self.initial_interval_ms)),
            max_elapsed_time: self.max_elapsed_ms.map(Duration::from_millis),
            ..ExponentialBackoff::default()
        };
        exponential.reset();
        Backoff {
            exponential,
            immediate: self.initial_interval_ms == 0,
            max_attempts: self.max_attempts,
            failures: 0,
        }
    }
}

/// Attempt counter and delay schedule for a single operation.
#[derive(Debug)]
pub struct Backoff {
    exponential: ExponentialBackoff,
    immediate: bool,
    max_attempts: Option<u32>,
    failures: u32,
}

impl Backoff {
    /// Record a failure. Returns the delay before the next attempt,
    /// or `None` once the attempt or time budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if matches!(self.max_attempts, Some(max) if self.failures >= max) {
            return None;
        }
        let delay = self.exponential.next_backoff()?;
        if self.immediate {
            Some(Duration::ZERO)
        } else {
            Some(delay)
        }
    }

    /// Number of failed attempts so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
