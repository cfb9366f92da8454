//! Rate limiting implementation

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorLimiter};

use crate::config::SourceConfig;

/// Client-side quota for one upstream API
pub struct RateLimiter {
    inner: DefaultDirectRateLimiter,
}

impl RateLimiter {
    /// Create a limiter from a source's rate settings
    #[must_use]
    pub fn new(config: &SourceConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(burst);
        Self {
            inner: GovernorLimiter::direct(quota),
        }
    }

    /// Try to acquire a permit without waiting
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }

    /// Wait until a permit is available
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}
