//! Bounded retry around a single match-and-act attempt.
//!
//! An attempt reports one of three results: it matched, it found nothing,
//! or the UI did not render in time. The policy reruns misses and timeouts
//! up to its budget and then reports [`RetryOutcome::Exhausted`] as a value.
//! Only hard errors from the attempt (`Err`) escape immediately.

use std::fmt;
use std::time::Duration;

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchAttempt<T> {
    Matched(T),
    NoMatch,
    DriverTimeout(String),
}

/// Why an attempt did not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NoMatch,
    DriverTimeout(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoMatch => write!(f, "no matching participant found"),
            FailureReason::DriverTimeout(detail) => write!(f, "timed out: {}", detail),
        }
    }
}

/// Final result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Matched { value: T, attempt: u32 },
    Exhausted { attempts: u32, last_failure: FailureReason },
}

/// Fixed attempt budget with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `attempt` (called with the 1-based attempt number) until it
    /// matches or the budget is spent. Each attempt must reset whatever UI
    /// state a previous attempt left behind.
    pub async fn run<T, E, F>(&self, mut attempt: F) -> Result<RetryOutcome<T>, E>
    where
        F: AsyncFnMut(u32) -> Result<MatchAttempt<T>, E>,
    {
        let budget = self.max_attempts.max(1);
        let mut last_failure = FailureReason::NoMatch;

        for number in 1..=budget {
            last_failure = match attempt(number).await? {
                MatchAttempt::Matched(value) => {
                    return Ok(RetryOutcome::Matched {
                        value,
                        attempt: number,
                    });
                }
                MatchAttempt::NoMatch => FailureReason::NoMatch,
                MatchAttempt::DriverTimeout(detail) => FailureReason::DriverTimeout(detail),
            };
            tracing::debug!(attempt = number, budget, reason = %last_failure, "attempt failed");

            if number < budget && !self.backoff.is_zero() {
                tokio::time::sleep(self.backoff).await;
            }
        }

        Ok(RetryOutcome::Exhausted {
            attempts: budget,
            last_failure,
        })
    }
}
