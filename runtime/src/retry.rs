//! Retry policy: pure strategies mapping `(attempt, elapsed, last_delay) →
//! delay | END`.
//!
//! Three variants are provided, matching the reference source's
//! `immediate_fail_retry`, `exponential_retry`, and `linear_retry`. All three
//! are pure — no sleeping happens here; [`crate::reply`] is the caller that
//! turns a returned delay into an actual wait.

use std::time::Duration;

/// What a [`RetryStrategy`] recommends after an empty read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Sleep for this long, then try again.
    Delay(Duration),
    /// Stop retrying.
    End,
}

/// A pure retry strategy: given how many empty reads have occurred, how much
/// time has elapsed, and the delay used last time, decide whether to wait
/// again and for how long.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryStrategy {
    /// Never retry; every call returns [`RetryDecision::End`].
    ImmediateFail,
    /// `delay = min(initial · factor^(attempt-1), max_delay)`, ending once
    /// `attempt > max_attempts`.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Multiplier applied per attempt.
        factor: f64,
        /// Upper bound on any single delay.
        max_delay: Duration,
        /// Attempt count after which retrying stops.
        max_attempts: u32,
    },
    /// `delay = min(step · attempt, max_delay)`, ending once `attempt >
    /// max_attempts`.
    Linear {
        /// Delay added per attempt.
        step: Duration,
        /// Upper bound on any single delay.
        max_delay: Duration,
        /// Attempt count after which retrying stops.
        max_attempts: u32,
    },
}

impl RetryStrategy {
    /// The reference source's exponential defaults: `initial=0.1, factor=2,
    /// max_delay=1.0, max_attempts=10`.
    #[must_use]
    pub const fn exponential_default() -> Self {
        Self::Exponential {
            initial: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(1),
            max_attempts: 10,
        }
    }

    /// The reference source's linear defaults: `step=0.2, max_delay=1.0,
    /// max_attempts=10`.
    #[must_use]
    pub const fn linear_default() -> Self {
        Self::Linear {
            step: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            max_attempts: 10,
        }
    }

    /// Decide the next step given the attempt count (1-based, incremented
    /// after each empty read), elapsed wait time, and the remaining timeout
    /// budget. The reader additionally treats the returned delay as
    /// [`RetryDecision::End`] if `elapsed + delay > timeout`.
    #[must_use]
    pub fn decide(self, attempt: u32, elapsed: Duration, timeout: Duration) -> RetryDecision {
        let raw = match self {
            Self::ImmediateFail => return RetryDecision::End,
            Self::Exponential {
                initial,
                factor,
                max_delay,
                max_attempts,
            } => {
                if attempt == 0 || attempt > max_attempts {
                    return RetryDecision::End;
                }
                let scaled = initial.as_secs_f64() * factor.powi((attempt - 1) as i32);
                if !scaled.is_finite() {
                    return RetryDecision::End;
                }
                Duration::from_secs_f64(scaled.min(max_delay.as_secs_f64()))
            }
            Self::Linear {
                step,
                max_delay,
                max_attempts,
            } => {
                if attempt == 0 || attempt > max_attempts {
                    return RetryDecision::End;
                }
                let scaled = step.as_secs_f64() * f64::from(attempt);
                Duration::from_secs_f64(scaled.min(max_delay.as_secs_f64()))
            }
        };

        if elapsed + raw > timeout {
            RetryDecision::End
        } else {
            RetryDecision::Delay(raw)
        }
    }
}

impl Default for RetryStrategy {
    /// [`Self::exponential_default`], matching `request_and_reply`'s default
    /// in §4.5.
    fn default() -> Self {
        Self::exponential_default()
    }
}
