//! Failsafe mechanisms: retry with backoff, upstream rate limiting

mod rate_limiter;
mod retry;

pub use rate_limiter::RateLimiter;
pub use retry::{RetryPolicy, with_retry};
