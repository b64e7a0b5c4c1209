//! Retry orchestration with classified failures.
//!
//! The default schedule is linear: the wait after attempt `n` is
//! `base * n`, so three attempts with a one-second base wait 1 s then 2 s.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::classify::{ClassifiedError, Classify};

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `base * attempt`.
    Linear { base: Duration },
    /// Same delay after every attempt.
    Fixed { delay: Duration },
    /// `base * factor^(attempt - 1)`, capped at `max`, optionally jittered by +/- 50%.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Self::Linear { base } => base.saturating_mul(attempt),
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = seconds.min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(capped.max(0.0));

                if !jitter {
                    return delay;
                }
                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let spread = millis / 2;
                let offset = fastrand::u64(0..=spread.saturating_mul(2));
                Duration::from_millis((millis - spread).saturating_add(offset))
            }
        }
    }

    /// Longest delay [`Backoff::delay`] can return for the given attempt.
    pub fn max_delay(self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                base,
                factor,
                max,
                jitter: true,
            } => {
                let delay = Self::Exponential {
                    base,
                    factor,
                    max,
                    jitter: false,
                }
                .delay(attempt);
                delay.saturating_add(delay / 2)
            }
            other => other.delay(attempt),
        }
    }
}

/// How many times to attempt an operation and how long to wait in between.
///
/// No `Default`: callers pick a policy, typically
/// [`RetryPolicy::suggested`] or one built from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Linear policy. `max_attempts` of zero is treated as one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Linear { base: base_delay },
        }
    }

    /// Three attempts, two-second linear base.
    pub fn suggested() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    /// Exactly one attempt, no waiting.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Time a full run can take when every attempt uses `per_attempt` and
    /// fails retryably.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        (1..self.max_attempts).fold(
            per_attempt.saturating_mul(self.max_attempts),
            |total, attempt| total.saturating_add(self.backoff.max_delay(attempt)),
        )
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The last classified error is returned as is.
    pub async fn retry<T, E, F, Fut>(&self, mut operation: F) -> Result<T, ClassifiedError>
    where
        E: Classify,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error.classify(),
            };

            if !error.retryable() {
                debug!(attempt, kind = %error.kind(), "non-retryable failure, giving up");
                return Err(error);
            }
            if attempt >= self.max_attempts {
                warn!(
                    attempts = attempt,
                    kind = %error.kind(),
                    error = %error,
                    "retry budget exhausted"
                );
                return Err(error);
            }

            let delay = self.backoff.delay(attempt);
            debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                kind = %error.kind(),
                "retryable failure, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Linear-backoff retry without constructing a policy first.
pub async fn retry<T, E, F, Fut>(
    operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, ClassifiedError>
where
    E: Classify,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryPolicy::new(max_attempts, base_delay)
        .retry(operation)
        .await
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tokio::time::Instant;

    use super::*;
    use crate::classify::{ErrorKind, RawFailure};

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let backoff = Backoff::Linear {
            base: Duration::from_secs(2),
        };
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(6));
    }

    #[test]
    fn worst_case_covers_every_attempt_and_wait() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        // 3 x 8 s of calls plus 2 s and 4 s of waiting.
        assert_eq!(policy.worst_case(Duration::from_secs(8)), Duration::from_secs(30));
        assert_eq!(
            RetryPolicy::single_attempt().worst_case(Duration::from_secs(8)),
            Duration::from_secs(8)
        );

        let jittered = RetryPolicy::new(2, Duration::ZERO).with_backoff(Backoff::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        });
        assert_eq!(jittered.worst_case(Duration::ZERO), Duration::from_millis(300));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_millis(500),
            jitter: false,
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
    }

    #[test]
    fn exponential_jitter_stays_within_half() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };
        for _ in 0..50 {
            let delay = backoff.delay(1).as_millis();
            assert!((100..=300).contains(&delay), "delay {delay}ms");
        }
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failure() {
        let calls = Cell::new(0_u32);
        let started = Instant::now();

        let result = retry(
            || {
                calls.set(calls.get() + 1);
                let call = calls.get();
                async move {
                    if call == 1 {
                        Err(RawFailure::Status {
                            status: 503,
                            body: String::new(),
                        })
                    } else {
                        Ok("prices")
                    }
                }
            },
            3,
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(result, Ok("prices"));
        assert_eq!(calls.get(), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_is_returned_verbatim() {
        let calls = Cell::new(0_u32);

        let result: Result<(), _> = RetryPolicy::suggested()
            .retry(|| {
                calls.set(calls.get() + 1);
                async {
                    Err(RawFailure::Status {
                        status: 401,
                        body: "token expired".into(),
                    })
                }
            })
            .await;

        let error = result.expect_err("must fail");
        assert_eq!(calls.get(), 1);
        assert_eq!(error.kind(), ErrorKind::Auth);
        assert_eq!(error.details(), Some("token expired"));
    }
}
