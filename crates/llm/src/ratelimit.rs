//! AI-call rate limiting.
//!
//! One token-bucket per process, injected into every caller that talks to
//! the summarization or embedding APIs. `acquire` suspends the calling task
//! until a slot is free, so quota pressure shows up as backpressure instead
//! of API rejections.

use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Token bucket limiting AI service calls to a fixed quota per minute.
pub struct ApiRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    per_minute: u32,
}

impl ApiRateLimiter {
    /// A quota of zero is treated as one call per minute.
    pub fn new(per_minute: u32) -> Self {
        let quota = NonZeroU32::new(per_minute.max(1)).expect("quota is non-zero");
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(quota)),
            per_minute: per_minute.max(1),
        }
    }

    /// Wait until a call slot is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exhausts_after_burst() {
        let limiter = ApiRateLimiter::new(3);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn zero_quota_is_clamped() {
        let limiter = ApiRateLimiter::new(0);
        assert_eq!(limiter.per_minute(), 1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn acquire_succeeds_within_quota() {
        let limiter = ApiRateLimiter::new(10);
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(limiter.try_acquire());
    }
}
