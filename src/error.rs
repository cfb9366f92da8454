//! Error types for devcredit

use std::io;
use std::time::Duration;

use thiserror::Error;

use credit_core::Source;

/// Result type alias for devcredit
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A fetch through the cache layer failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// One source could not deliver an activity record
    #[error("{0} unavailable: {1}")]
    SourceUnavailable(Source, String),

    /// Every connected source failed, so no meaningful score exists
    #[error("All connected sources failed: {}", .0.join("; "))]
    AllSourcesFailed(Vec<String>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors produced by the fetch layer and the source adapters.
///
/// `Clone` because one coalesced failure is delivered to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure or server-side error; retried with backoff
    #[error("network error: {0}")]
    Network(String),

    /// An attempt exceeded its time budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream quota exhausted; retried with a longer backoff
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Server-provided hint
        retry_after: Option<Duration>,
    },

    /// Identity does not exist at the source
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or rejected credentials
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// Response did not match the expected shape; never retried
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Request was cancelled before it settled
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Short stable name for logs and metric labels
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::AuthRequired(_) => "auth_required",
            Self::Validation(_) => "validation",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether another attempt may succeed
    #[must_use]
    pub fn is_retryable(&self, retry_on_timeout: bool) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited { .. } => true,
            Self::Timeout(_) => retry_on_timeout,
            Self::NotFound(_) | Self::AuthRequired(_) | Self::Validation(_) | Self::Cancelled => {
                false
            }
        }
    }

    /// Validation error with a single message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }
}
