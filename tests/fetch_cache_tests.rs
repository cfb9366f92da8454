//! Fetch cache behavior: coalescing, TTL, retries, timeouts and cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use devcredit::FetchError;
use devcredit::config::FetchConfig;
use devcredit::fetch::{DataKind, FetchCache, FetchOptions, ValidationReport};

type SourceFuture = BoxFuture<'static, Result<Value, FetchError>>;

fn config() -> FetchConfig {
    FetchConfig {
        retries: 3,
        backoff_base: Duration::from_millis(100),
        max_backoff: Duration::from_secs(10),
        ..FetchConfig::default()
    }
}

fn number() -> FetchOptions<u32> {
    FetchOptions::new(DataKind::Generic)
}

/// Source answering with `respond(call_index)` after `delay`
fn source<R>(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
    respond: R,
) -> impl Fn(CancellationToken) -> SourceFuture + Send + Sync + 'static + use<R>
where
    R: Fn(usize) -> Result<Value, FetchError> + Send + Sync + 'static,
{
    let calls = Arc::clone(calls);
    move |_token| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let response = respond(n);
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            response
        }
        .boxed()
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_fetches_share_one_request() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = number();

    let results = join_all((0..10).map(|_| {
        cache.fetch(
            "github:alice:profile",
            source(&calls, Duration::from_millis(100), |_| Ok(json!(7))),
            &opts,
        )
    }))
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r == &Ok(7)));

    let stats = cache.stats();
    assert_eq!(stats.coalesced, 9);
    assert_eq!(stats.in_flight_count, 0);
    assert_eq!(stats.size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_entry_is_served_until_ttl_elapses() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = number().ttl(Duration::from_secs(60));
    let key = "lens:alice:profile";

    let fetch = || cache.fetch(key, source(&calls, Duration::ZERO, |n| Ok(json!(n))), &opts);

    assert_eq!(fetch().await, Ok(0));
    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(fetch().await, Ok(0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(fetch().await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success_returns_value() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let result = cache
        .fetch(
            "onchain:0xabc:txlist",
            source(&calls, Duration::ZERO, |n| {
                if n < 2 {
                    Err(FetchError::Network("connection reset".into()))
                } else {
                    Ok(json!(42))
                }
            }),
            &number(),
        )
        .await;

    assert_eq!(result, Ok(42));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 200ms + 400ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(600));
}

#[tokio::test(start_paused = true)]
async fn test_retries_stop_after_configured_attempts() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));

    let result = cache
        .fetch(
            "github:bob:events",
            source(&calls, Duration::ZERO, |_| Err(FetchError::Network("502".into()))),
            &number().retries(1),
        )
        .await;

    assert_eq!(result, Err(FetchError::Network("502".into())));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_validation_errors_are_attempted_once() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));

    let result = cache
        .fetch(
            "github:alice:repos",
            source(&calls, Duration::ZERO, |_| Ok(json!("not a number"))),
            &number(),
        )
        .await;

    assert!(matches!(result, Err(FetchError::Validation(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_validation_hook_is_not_cached() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = number().validate(|n| {
        if *n > 0 {
            ValidationReport::ok()
        } else {
            ValidationReport::from_errors(vec!["must be positive".into()])
        }
    });

    for _ in 0..2 {
        let result = cache
            .fetch("generic:x:count", source(&calls, Duration::ZERO, |_| Ok(json!(0))), &opts)
            .await;
        assert_eq!(result, Err(FetchError::Validation(vec!["must be positive".into()])));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_terminal_and_cancels_the_attempt() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(AtomicBool::new(false));

    let source = {
        let calls = Arc::clone(&calls);
        let observed = Arc::clone(&observed);
        move |token: CancellationToken| -> SourceFuture {
            calls.fetch_add(1, Ordering::SeqCst);
            let observed = Arc::clone(&observed);
            tokio::spawn(async move {
                token.cancelled().await;
                observed.store(true, Ordering::SeqCst);
            });
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!(1))
            }
            .boxed()
        }
    };

    let result = cache
        .fetch("farcaster:alice:user", source, &number().timeout(Duration::from_secs(1)))
        .await;

    assert_eq!(result, Err(FetchError::Timeout(Duration::from_secs(1))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(observed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_retry_on_timeout_retries_timed_out_attempts() {
    let cache = FetchCache::new(FetchConfig {
        retries: 2,
        retry_on_timeout: true,
        ..config()
    });
    let calls = Arc::new(AtomicUsize::new(0));

    let result = cache
        .fetch(
            "lens:slow:profile",
            source(&calls, Duration::from_secs(3600), |_| Ok(json!(1))),
            &number().timeout(Duration::from_millis(500)),
        )
        .await;

    assert_eq!(result, Err(FetchError::Timeout(Duration::from_millis(500))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_neither_retried_nor_cached() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = number();

    for _ in 0..2 {
        let result = cache
            .fetch(
                "github:ghost:profile",
                source(&calls, Duration::ZERO, |_| Err(FetchError::NotFound("ghost".into()))),
                &opts,
            )
            .await;
        assert_eq!(result, Err(FetchError::NotFound("ghost".into())));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_at_least_retry_after() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let result = cache
        .fetch(
            "github:alice:search",
            source(&calls, Duration::ZERO, |n| {
                if n == 0 {
                    Err(FetchError::RateLimited {
                        retry_after: Some(Duration::from_secs(2)),
                    })
                } else {
                    Ok(json!(5))
                }
            }),
            &number(),
        )
        .await;

    assert_eq!(result, Ok(5));
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_removes_matching_keys() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = number();

    for key in ["github:a:profile", "github:b:profile", "lens:a:profile"] {
        cache
            .fetch(key, source(&calls, Duration::ZERO, |_| Ok(json!(1))), &opts)
            .await
            .unwrap();
    }

    assert_eq!(cache.invalidate("github:*"), 2);
    let stats = cache.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.evictions, 2);
    assert_eq!(cache.peek::<u32>("lens:a:profile"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_fails_waiters_with_cancelled() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));

    let waiter = {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            cache
                .fetch(
                    "onchain:0xabc:balance",
                    source(&calls, Duration::from_secs(3600), |_| Ok(json!(1))),
                    &number(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cache.stats().in_flight_count, 1);
    assert_eq!(cache.cancel_all(), 1);

    assert_eq!(waiter.await.unwrap(), Err(FetchError::Cancelled));
    assert_eq!(cache.stats().in_flight_count, 0);
    assert_eq!(cache.stats().size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_source_releases_its_key() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let flaky = |calls: &Arc<AtomicUsize>| {
        source(calls, Duration::ZERO, |n| {
            assert!(n > 0, "upstream client panicked");
            Ok(json!(5))
        })
    };

    let first = cache.fetch("github:alice:profile", flaky(&calls), &number()).await;
    assert_eq!(first, Err(FetchError::Cancelled));
    assert_eq!(cache.stats().in_flight_count, 0);

    let second = cache.fetch("github:alice:profile", flaky(&calls), &number()).await;
    assert_eq!(second, Ok(5));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().in_flight_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_waiter_does_not_cancel_shared_request() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = number();
    let key = "farcaster:alice:casts";

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        cache.fetch(key, source(&calls, Duration::from_millis(100), |_| Ok(json!(9))), &opts),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cache.peek::<u32>(key), Some(9));

    let again = cache
        .fetch(key, source(&calls, Duration::ZERO, |_| Ok(json!(0))), &opts)
        .await;
    assert_eq!(again, Ok(9));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_type_mismatch_under_one_key_is_a_validation_error() {
    let cache = FetchCache::new(config());
    cache.store("generic:x:value", 1u32, DataKind::Generic);

    let calls = Arc::new(AtomicUsize::new(0));
    let result = cache
        .fetch(
            "generic:x:value",
            source(&calls, Duration::ZERO, |_| Ok(json!("s"))),
            &FetchOptions::<String>::new(DataKind::Generic),
        )
        .await;

    assert!(matches!(result, Err(FetchError::Validation(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stats_track_hits_and_misses() {
    let cache = FetchCache::new(config());
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = number();

    for _ in 0..4 {
        cache
            .fetch("github:a:orgs", source(&calls, Duration::ZERO, |_| Ok(json!(3))), &opts)
            .await
            .unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);

    cache.shutdown();
    assert_eq!(cache.stats().size, 0);
}
