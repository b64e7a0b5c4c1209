use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::classify::RawFailure;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client-side request budget for the remote service.
///
/// Requests over budget fail immediately with [`RawFailure::RateLimited`],
/// which classifies as a retryable 429 so the retry loop spaces them out.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DirectRateLimiter>,
}

impl RequestThrottle {
    pub fn new(window: Duration, limit: u32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(window, limit))),
        }
    }

    /// `limit` requests per minute, all available as an initial burst.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(Duration::from_secs(60), limit)
    }

    pub fn check(&self) -> Result<(), RawFailure> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }
        debug!("request budget exhausted");
        Err(RawFailure::RateLimited)
    }
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle").finish_non_exhaustive()
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);

    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_requests_over_budget() {
        let throttle = RequestThrottle::per_minute(2);

        assert!(throttle.check().is_ok());
        assert!(throttle.check().is_ok());
        assert_eq!(throttle.check(), Err(RawFailure::RateLimited));
    }

    #[test]
    fn zero_limit_still_allows_one_request() {
        let throttle = RequestThrottle::per_minute(0);
        assert!(throttle.check().is_ok());
        assert!(throttle.check().is_err());
    }
}
