//! Retry policy.
//!
//! A pure decision over the attempt count and the normalized dispatch
//! outcome: success completes the job, a failure with attempts left
//! reschedules it after a fixed delay, and anything else fails it for good.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::dispatch::DispatchOutcome;

use super::job::JobStatus;

/// Default number of attempts before a job is failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before a failed job is retried.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10 * 60);

/// What to do with a job after one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Mark the job completed.
    Complete,
    /// Keep the job pending and run it again at `at`.
    Retry { at: DateTime<Utc> },
    /// Mark the job failed.
    Fail,
}

impl RetryDecision {
    /// Status the job ends up in.
    pub fn status(&self) -> JobStatus {
        match self {
            RetryDecision::Complete => JobStatus::Completed,
            RetryDecision::Retry { .. } => JobStatus::Pending,
            RetryDecision::Fail => JobStatus::Failed,
        }
    }
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }

    /// Decides the next state given the attempt count including this try.
    pub fn decide(
        &self,
        attempts_after: u32,
        outcome: &DispatchOutcome,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        match outcome {
            DispatchOutcome::Success { .. } => RetryDecision::Complete,
            DispatchOutcome::Failure { .. } if attempts_after < self.max_attempts => {
                RetryDecision::Retry {
                    at: add_duration(now, self.retry_delay),
                }
            }
            DispatchOutcome::Failure { .. } => RetryDecision::Fail,
        }
    }

    /// Attempts still available after `attempts_after` tries.
    pub fn remaining_attempts(&self, attempts_after: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts_after)
    }
}

/// Converts a std duration, saturating at the largest chrono duration.
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Adds a std duration to a timestamp, saturating at the maximum time.
pub(crate) fn add_duration(time: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    time.checked_add_signed(to_chrono(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> DispatchOutcome {
        DispatchOutcome::failure("boom")
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(600));
    }

    #[test]
    fn test_success_completes_regardless_of_attempts() {
        let policy = RetryPolicy::default();
        let now = Utc::now();
        for attempts in [1, 3, 10] {
            let decision = policy.decide(attempts, &DispatchOutcome::success(), now);
            assert_eq!(decision, RetryDecision::Complete);
            assert_eq!(decision.status(), JobStatus::Completed);
        }
    }

    #[test]
    fn test_failure_below_max_retries_after_delay() {
        let policy = RetryPolicy::default();
        let now = Utc::now();

        let decision = policy.decide(2, &failure(), now);
        assert_eq!(
            decision,
            RetryDecision::Retry {
                at: now + chrono::Duration::minutes(10)
            }
        );
        assert_eq!(decision.status(), JobStatus::Pending);
        assert_eq!(policy.remaining_attempts(2), 1);
    }

    #[test]
    fn test_failure_at_max_fails() {
        let policy = RetryPolicy::default();
        let now = Utc::now();

        assert_eq!(policy.decide(3, &failure(), now), RetryDecision::Fail);
        assert_eq!(policy.decide(4, &failure(), now), RetryDecision::Fail);
        assert_eq!(policy.remaining_attempts(4), 0);
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1));
        assert_eq!(
            policy.decide(1, &failure(), Utc::now()),
            RetryDecision::Fail
        );
    }

    #[test]
    fn test_add_duration_saturates() {
        let now = Utc::now();
        assert_eq!(add_duration(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            add_duration(now, Duration::from_secs(60)),
            now + chrono::Duration::minutes(1)
        );
    }
}
