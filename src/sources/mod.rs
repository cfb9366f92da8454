//! Source adapters
//!
//! Each adapter turns an identity (login, handle or address) into a canonical
//! activity record from `credit_core`. All network access goes through the
//! shared [`FetchCache`](crate::fetch::FetchCache), so repeated and concurrent
//! lookups are cached and coalesced.

pub mod farcaster;
pub mod github;
mod http;
pub mod lens;
pub mod onchain;

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use credit_core::Source;

use crate::error::FetchError;

pub use farcaster::FarcasterSource;
pub use github::GithubSource;
pub use http::{HttpSource, classify_status};
pub use lens::LensSource;
pub use onchain::OnChainSource;

/// Adapter from one third-party API to a canonical activity record
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Canonical record this adapter produces
    type Record: Clone + Send + Sync + 'static;

    /// Which source this adapter serves
    fn source(&self) -> Source;

    /// Fetch and normalize the activity of `identity`.
    ///
    /// Cancelling `cancel` abandons this caller's wait; requests shared with
    /// other callers keep running.
    async fn fetch_activity(
        &self,
        identity: &str,
        cancel: CancellationToken,
    ) -> Result<Self::Record, FetchError>;
}

/// Run `fut` unless `cancel` fires first
pub(crate) async fn until_cancelled<T, F>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FetchError::Cancelled),
        result = fut => result,
    }
}

/// Non-negative integer field, saturating at `u32::MAX`; 0 when absent
pub(crate) fn count(value: &Value) -> u32 {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

/// RFC 3339 timestamp field
pub(crate) fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Unix-seconds timestamp field, given as a number or a decimal string
pub(crate) fn unix_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let secs = value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))?;
    DateTime::from_timestamp(secs, 0)
}

/// Validation error unless `field` holds a non-empty string
pub(crate) fn required_str(value: &Value, field: &str) -> Result<String, FetchError> {
    value[field]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| FetchError::validation(format!("missing field `{field}`")))
}
