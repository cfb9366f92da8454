//! HTTP client shared by the source adapters
//!
//! Wraps `reqwest` with a per-source quota, default headers, cancellation and
//! the mapping from HTTP status codes to [`FetchError`] variants.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::failsafe::RateLimiter;
use crate::fetch::{FetchCache, FetchOptions};
use crate::{Error, Result};

/// Rate-limited JSON client for one upstream API
pub struct HttpSource {
    name: &'static str,
    client: Client,
    base_url: String,
    headers: HeaderMap,
    limiter: RateLimiter,
    timeout: Duration,
}

impl HttpSource {
    /// Create a client for `name`, using `default_base_url` unless the config overrides it
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        name: &'static str,
        config: &SourceConfig,
        default_base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("devcredit/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            name,
            client,
            base_url: config.base_url_or(default_base_url),
            headers: HeaderMap::new(),
            limiter: RateLimiter::new(config),
            timeout,
        })
    }

    /// Send `value` in header `name` on every request
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the value is not a valid header value.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("invalid {} header for {}: {e}", name, self.name)))?;
        value.set_sensitive(true);
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Source name used in logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Endpoint all paths are resolved against
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` and decode the JSON body
    ///
    /// # Errors
    ///
    /// Returns the mapped [`FetchError`] for transport failures and error statuses.
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &CancellationToken,
    ) -> std::result::Result<Value, FetchError> {
        let request = self
            .client
            .get(self.url(path))
            .headers(self.headers.clone())
            .query(query);
        self.send(request, token).await
    }

    /// POST a JSON `body` to `path` and decode the JSON response
    ///
    /// # Errors
    ///
    /// Returns the mapped [`FetchError`] for transport failures and error statuses.
    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
        token: &CancellationToken,
    ) -> std::result::Result<Value, FetchError> {
        let request = self
            .client
            .post(self.url(path))
            .headers(self.headers.clone())
            .json(body);
        self.send(request, token).await
    }

    /// GET `path` through `cache` under `key`
    ///
    /// # Errors
    ///
    /// Returns the fetch error once retries are exhausted.
    pub async fn get_cached<T>(
        self: &Arc<Self>,
        cache: &FetchCache,
        key: &str,
        path: String,
        query: Vec<(&'static str, String)>,
        opts: &FetchOptions<T>,
    ) -> std::result::Result<T, FetchError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let http = Arc::clone(self);
        cache
            .fetch(
                key,
                move |token| {
                    let http = Arc::clone(&http);
                    let path = path.clone();
                    let query = query.clone();
                    async move { http.get_json(&path, &query, &token).await }
                },
                opts,
            )
            .await
    }

    /// POST `body` to `path` through `cache` under `key`
    ///
    /// # Errors
    ///
    /// Returns the fetch error once retries are exhausted.
    pub async fn post_cached<T>(
        self: &Arc<Self>,
        cache: &FetchCache,
        key: &str,
        path: String,
        body: Value,
        opts: &FetchOptions<T>,
    ) -> std::result::Result<T, FetchError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let http = Arc::clone(self);
        cache
            .fetch(
                key,
                move |token| {
                    let http = Arc::clone(&http);
                    let path = path.clone();
                    let body = body.clone();
                    async move { http.post_json(&path, &body, &token).await }
                },
                opts,
            )
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        token: &CancellationToken,
    ) -> std::result::Result<Value, FetchError> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(FetchError::Cancelled),
            result = self.execute(request) => result,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> std::result::Result<Value, FetchError> {
        self.limiter.acquire().await;

        let response = request.send().await.map_err(|e| self.transport_error(&e))?;
        let status = response.status();
        if let Some(err) = classify_status(status, response.headers(), Utc::now().timestamp()) {
            debug!(source = self.name, %status, error = %err, "Upstream returned error status");
            return Err(err);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| self.transport_error(&e))
    }

    fn transport_error(&self, e: &reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if e.is_decode() {
            FetchError::validation(format!("{} returned invalid JSON: {e}", self.name))
        } else {
            FetchError::Network(format!("{}: {e}", self.name))
        }
    }
}

/// Map a non-success status to a [`FetchError`]; `None` for 2xx.
///
/// `now` is the current Unix time, used to turn `x-ratelimit-reset` into a delay.
#[must_use]
pub fn classify_status(status: StatusCode, headers: &HeaderMap, now: i64) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    let quota_exhausted = header_str(headers, "x-ratelimit-remaining") == Some("0");
    let err = match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
            retry_after: retry_after(headers, now),
        },
        StatusCode::FORBIDDEN if quota_exhausted => FetchError::RateLimited {
            retry_after: retry_after(headers, now),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::AuthRequired(format!("upstream returned {status}"))
        }
        StatusCode::NOT_FOUND => FetchError::NotFound(format!("upstream returned {status}")),
        StatusCode::REQUEST_TIMEOUT => FetchError::Network(format!("upstream returned {status}")),
        s if s.is_server_error() => FetchError::Network(format!("upstream returned {status}")),
        _ => FetchError::validation(format!("upstream rejected the request with {status}")),
    };
    Some(err)
}

/// `Retry-After` seconds, else the distance to `x-ratelimit-reset`
fn retry_after(headers: &HeaderMap, now: i64) -> Option<Duration> {
    if let Some(secs) =
        header_str(headers, "retry-after").and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }
    let reset = header_str(headers, "x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    Some(Duration::from_secs(u64::try_from(reset - now).unwrap_or(0)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
