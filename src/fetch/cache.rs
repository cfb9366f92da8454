//! In-memory TTL cache with request coalescing
//!
//! Values are stored type-erased and downcast per caller, so one cache serves
//! every adapter. A miss starts one background task per key; concurrent callers
//! for the same key attach to that task's shared result instead of issuing
//! their own request.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::options::{DataKind, FetchOptions};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::failsafe::{RetryPolicy, with_retry};

type AnyValue = Arc<dyn Any + Send + Sync>;
type SharedResult = Shared<BoxFuture<'static, Result<AnyValue, FetchError>>>;

/// Cloneable handle to the process-wide fetch cache
#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: FetchConfig,
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, InFlight>,
    stats: CacheStats,
    next_id: AtomicU64,
}

struct CacheEntry {
    value: AnyValue,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// One outstanding request; owned by the in-flight table
struct InFlight {
    id: u64,
    result: SharedResult,
    token: CancellationToken,
    abort: AbortHandle,
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    coalesced: AtomicU64,
}

/// Point-in-time view of the cache
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Live and not-yet-evicted entries
    pub size: usize,
    /// Outstanding requests
    pub in_flight_count: usize,
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that found nothing live
    pub misses: u64,
    /// Entries removed for expiry or invalidation
    pub evictions: u64,
    /// Callers that attached to an outstanding request
    pub coalesced: u64,
    /// `hits / (hits + misses)`, 0.0 when nothing was looked up
    pub hit_rate: f64,
}

impl FetchCache {
    /// Create an empty cache
    #[must_use]
    pub fn new(config: FetchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                stats: CacheStats::default(),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Fetch configuration this cache runs with
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.inner.config
    }

    /// Return the cached value for `key`, join an outstanding request for it,
    /// or start one by calling `source`.
    ///
    /// `source` receives a fresh token per attempt; the token is cancelled when
    /// the attempt times out or the cache is shut down. Dropping the returned
    /// future only abandons this caller's wait.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt, or [`FetchError::Validation`] if
    /// a cached value under `key` has a different type than `T`.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &str,
        source: F,
        opts: &FetchOptions<T>,
    ) -> Result<T, FetchError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        if let Some(value) = self.lookup(key, true) {
            return downcast(key, &value);
        }

        let shared = match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                self.inner.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                telemetry_metrics::counter!("devcredit_fetch_coalesced_total").increment(1);
                debug!(key, "Joining in-flight request");
                entry.get().result.clone()
            }
            Entry::Vacant(entry) => {
                // A request may have settled between the lookup and the entry lock
                if let Some(value) = self.lookup(key, false) {
                    return downcast(key, &value);
                }
                let in_flight = self.spawn_request(key, source, opts.clone());
                let shared = in_flight.result.clone();
                entry.insert(in_flight);
                shared
            }
        };

        let value = shared.await?;
        downcast(key, &value)
    }

    /// Cached value under `key` if it is live and of type `T`
    #[must_use]
    pub fn peek<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let value = self.lookup(key, true)?;
        value.downcast_ref::<T>().cloned()
    }

    /// Store a derived value under `key` with the lifetime of `kind`
    pub fn store<T: Send + Sync + 'static>(&self, key: &str, value: T, kind: DataKind) {
        self.insert(key, Arc::new(value), self.inner.config.ttl.ttl(kind));
    }

    /// Remove every entry whose key matches a glob `pattern`; returns the count
    pub fn invalidate(&self, pattern: &str) -> usize {
        let Ok(pattern) = glob::Pattern::new(pattern) else {
            warn!(pattern, "Ignoring invalid invalidation pattern");
            return 0;
        };
        let before = self.inner.entries.len();
        self.inner.entries.retain(|key, _| !pattern.matches(key));
        let removed = before.saturating_sub(self.inner.entries.len());
        self.record_evictions(removed);
        debug!(pattern = pattern.as_str(), removed, "Invalidated cache entries");
        removed
    }

    /// Abort every outstanding request; waiters receive [`FetchError::Cancelled`]
    pub fn cancel_all(&self) -> usize {
        let keys: Vec<String> = self
            .inner
            .in_flight
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut cancelled = 0;
        for key in keys {
            if let Some((_, request)) = self.inner.in_flight.remove(&key) {
                request.token.cancel();
                request.abort.abort();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(cancelled, "Cancelled in-flight requests");
        }
        cancelled
    }

    /// Remove expired entries; returns the count
    pub fn evict_expired(&self) -> usize {
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.inner.entries.len());
        self.record_evictions(removed);
        removed
    }

    /// Drop every cached value
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Cancel outstanding requests and drop every cached value
    pub fn shutdown(&self) {
        self.cancel_all();
        self.clear();
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        let stats = &self.inner.stats;
        let hits = stats.hits.load(Ordering::Relaxed);
        let misses = stats.misses.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        };
        CacheStatsSnapshot {
            size: self.inner.entries.len(),
            in_flight_count: self.inner.in_flight.len(),
            hits,
            misses,
            evictions: stats.evictions.load(Ordering::Relaxed),
            coalesced: stats.coalesced.load(Ordering::Relaxed),
            hit_rate,
        }
    }

    /// Live value under `key`; expired entries are evicted on the way
    fn lookup(&self, key: &str, record: bool) -> Option<AnyValue> {
        let found = match self.inner.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(Arc::clone(&entry.value)),
            Some(entry) => {
                drop(entry);
                if self
                    .inner
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired())
                    .is_some()
                {
                    self.record_evictions(1);
                }
                None
            }
            None => None,
        };

        if record {
            if found.is_some() {
                self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
                telemetry_metrics::counter!("devcredit_fetch_cache_hits_total").increment(1);
                debug!(key, "Cache hit");
            } else {
                self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);
                telemetry_metrics::counter!("devcredit_fetch_cache_misses_total").increment(1);
                debug!(key, "Cache miss");
            }
        }
        found
    }

    fn insert(&self, key: &str, value: AnyValue, ttl: Duration) {
        self.inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.inner
                .stats
                .evictions
                .fetch_add(count as u64, Ordering::Relaxed);
            telemetry_metrics::counter!("devcredit_fetch_cache_evictions_total")
                .increment(count as u64);
        }
    }

    /// Spawn the attempt loop for `key`.
    ///
    /// The task stores a success before removing its own in-flight entry, so a
    /// caller arriving in between finds either the entry or the cached value.
    /// The entry is also removed when the task panics or is aborted.
    fn spawn_request<T, F, Fut>(&self, key: &str, source: F, opts: FetchOptions<T>) -> InFlight
    where
        T: Send + Sync + 'static,
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let cache = self.clone();
        let key = key.to_string();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let _release = InFlightRelease {
                cache: cache.clone(),
                key: key.clone(),
                id,
            };
            let config = &cache.inner.config;
            let mut policy = RetryPolicy::new(config);
            if let Some(retries) = opts.retries {
                policy = policy.with_retries(retries);
            }
            let timeout = opts.timeout.unwrap_or(config.timeout);
            let ttl = opts.ttl.unwrap_or_else(|| config.ttl.ttl(opts.kind));

            telemetry_metrics::counter!("devcredit_fetch_requests_total", "kind" => opts.kind.as_str())
                .increment(1);

            let outcome = with_retry(&policy, &key, &task_token, |attempt_token| {
                let call = source(attempt_token.clone());
                let opts = &opts;
                async move {
                    match tokio::time::timeout(timeout, call).await {
                        Ok(raw) => opts.apply(raw?),
                        Err(_) => {
                            attempt_token.cancel();
                            Err(FetchError::Timeout(timeout))
                        }
                    }
                }
            })
            .await;

            let outcome = match outcome {
                Ok(value) => {
                    let value: AnyValue = Arc::new(value);
                    cache.insert(&key, Arc::clone(&value), ttl);
                    debug!(key = %key, ttl_ms = ttl.as_millis(), "Stored fetch result");
                    Ok(value)
                }
                Err(e) => {
                    telemetry_metrics::counter!("devcredit_fetch_failures_total", "reason" => e.kind())
                        .increment(1);
                    warn!(key = %key, error = %e, "Fetch failed");
                    Err(e)
                }
            };

            outcome
        });

        let abort = handle.abort_handle();
        let result = async move { handle.await.unwrap_or(Err(FetchError::Cancelled)) }
            .boxed()
            .shared();

        InFlight {
            id,
            result,
            token,
            abort,
        }
    }
}

/// Removes the owning task's in-flight entry when dropped
struct InFlightRelease {
    cache: FetchCache,
    key: String,
    id: u64,
}

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        self.cache
            .inner
            .in_flight
            .remove_if(&self.key, |_, request| request.id == self.id);
    }
}

fn downcast<T: Clone + 'static>(key: &str, value: &AnyValue) -> Result<T, FetchError> {
    value.downcast_ref::<T>().cloned().ok_or_else(|| {
        FetchError::validation(format!(
            "cached value under {key} has type other than {}",
            std::any::type_name::<T>()
        ))
    })
}
