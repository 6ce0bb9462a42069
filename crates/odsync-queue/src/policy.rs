//! Retry policies
//!
//! A [`RetryPolicy`] is attached to every enqueued task. After a failed
//! attempt the worker asks [`RetryPolicy::decide`] what to do next; the
//! answer depends on the error class, the policy's predicate and the number
//! of retries already spent.

use crate::error::{FailureReason, TaskError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Same delay every time
    Fixed {
        /// Delay in milliseconds
        delay_ms: u64,
    },
    /// `initial * 2^retry`, capped at `max`
    Exponential {
        /// First delay in milliseconds
        initial_ms: u64,
        /// Upper bound in milliseconds
        max_ms: u64,
        /// Randomize each delay within `[d/2, d]`
        #[serde(default)]
        jitter: bool,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (0-based)
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential {
                initial_ms,
                max_ms,
                jitter,
            } => {
                let factor = 1u64.checked_shl(retry.min(63)).unwrap_or(u64::MAX);
                let ms = initial_ms.saturating_mul(factor).min(max_ms);
                if jitter && ms > 1 {
                    Duration::from_millis(rand::rng().random_range(ms / 2..=ms))
                } else {
                    Duration::from_millis(ms)
                }
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            initial_ms: 1_000,
            max_ms: 60_000,
            jitter: false,
        }
    }
}

/// Decides whether an error is worth another attempt
#[derive(Clone)]
pub struct RetryPredicate {
    name: &'static str,
    f: Arc<dyn Fn(&TaskError) -> bool + Send + Sync>,
}

impl RetryPredicate {
    /// Custom predicate
    pub fn custom<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&TaskError) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            f: Arc::new(f),
        }
    }

    /// Retry only when the connection was refused
    #[must_use]
    pub fn connection_refused() -> Self {
        Self::custom("is_connection_refused", TaskError::is_connection_refused)
    }

    /// Retry on any transient infrastructure error
    #[must_use]
    pub fn transient() -> Self {
        Self::custom("is_transient", TaskError::is_transient)
    }

    /// Never retry
    #[must_use]
    pub fn never() -> Self {
        Self::custom("never", |_| false)
    }

    /// Predicate name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Evaluate predicate
    #[inline]
    #[must_use]
    pub fn matches(&self, error: &TaskError) -> bool {
        (self.f)(error)
    }
}

impl fmt::Debug for RetryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RetryPredicate").field(&self.name).finish()
    }
}

/// What the worker does after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue after `delay`
    Retry {
        /// Backoff delay
        delay: Duration,
    },
    /// Mark permanently failed
    GiveUp(FailureReason),
}

/// Per-task retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
    predicate: RetryPredicate,
}

impl RetryPolicy {
    /// Create policy
    #[inline]
    #[must_use]
    pub fn new(max_retries: u32, backoff: Backoff, predicate: RetryPredicate) -> Self {
        Self {
            max_retries,
            backoff,
            predicate,
        }
    }

    /// Single attempt, no retry
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Backoff::None, RetryPredicate::never())
    }

    /// Policy used by mutating graph operations: 5 retries on connection refusal
    #[must_use]
    pub fn connection_refused() -> Self {
        Self::new(5, Backoff::default(), RetryPredicate::connection_refused())
    }

    /// With max retries
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// With backoff
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// With predicate
    #[inline]
    #[must_use]
    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Retries allowed after the first attempt
    #[inline]
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff schedule
    #[inline]
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Retry predicate
    #[inline]
    #[must_use]
    pub fn predicate(&self) -> &RetryPredicate {
        &self.predicate
    }

    /// Decide after a failure, `retry_count` retries having been spent
    #[must_use]
    pub fn decide(&self, error: &TaskError, retry_count: u32) -> RetryDecision {
        if error.is_permanent() {
            return RetryDecision::GiveUp(FailureReason::Permanent);
        }
        if !self.predicate.matches(error) {
            return RetryDecision::GiveUp(FailureReason::NotRetryable);
        }
        if retry_count >= self.max_retries {
            return RetryDecision::GiveUp(FailureReason::RetriesExhausted);
        }
        RetryDecision::Retry {
            delay: self.backoff.delay(retry_count),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
