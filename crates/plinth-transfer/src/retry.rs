//! Explicit retry/backoff state machine for transfer requests.
//!
//! Modeled as `Attempting(n) → Waiting(delay) → Attempting(n+1) → …
//! → Exhausted` so backoff and exhaustion are testable without simulating
//! wall-clock delays.

use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// Fixed retry budget: base delay doubles each attempt up to a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after `attempt` failures: `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let delay_ms = (self.base_delay.as_millis() as u64)
            .saturating_mul(2u64.saturating_pow(exp));
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Where one retried request currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt `n` (1-based) is in flight.
    Attempting(u32),
    /// Attempt failed; waiting `delay` before `next_attempt`.
    Waiting { next_attempt: u32, delay: Duration },
    /// Retry budget spent; the failure is terminal.
    Exhausted,
}

/// Drives one request's retries through the policy.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetrySchedule {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting(1),
        }
    }

    #[must_use]
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Attempt number currently in flight, if any.
    #[must_use]
    pub fn attempt(&self) -> Option<u32> {
        match self.state {
            RetryState::Attempting(n) => Some(n),
            _ => None,
        }
    }

    /// Record a failed attempt, transitioning to `Waiting` with the next
    /// backoff delay, or `Exhausted` once the budget is spent.
    pub fn record_failure(&mut self) -> RetryState {
        if let RetryState::Attempting(n) = self.state {
            self.state = if n >= self.policy.max_attempts {
                RetryState::Exhausted
            } else {
                RetryState::Waiting {
                    next_attempt: n + 1,
                    delay: self.policy.backoff_for(n),
                }
            };
        }
        self.state
    }

    /// Consume the wait, transitioning `Waiting` → `Attempting`.
    /// Returns the new attempt number, or `None` outside `Waiting`.
    pub fn begin_next(&mut self) -> Option<u32> {
        if let RetryState::Waiting { next_attempt, .. } = self.state {
            self.state = RetryState::Attempting(next_attempt);
            Some(next_attempt)
        } else {
            None
        }
    }
}
