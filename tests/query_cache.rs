use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use costboard::cache::{
    FetchError, FetchOptions, ObserveOptions, Query, QueryCache, QueryKey, QueryObserver,
    QueryParams, compose_key,
};
use thiserror::Error;
use tokio::sync::Barrier;

#[derive(Debug, Error)]
#[error("{0}")]
struct Failure(&'static str);

fn counted_query(raw: &str, calls: &Arc<AtomicUsize>, delay: Duration) -> Query<usize> {
    let calls = Arc::clone(calls);
    Query::new(QueryKey::new(raw), move || {
        let calls = Arc::clone(&calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(delay).await;
            Ok::<_, FetchError>(n)
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_across_threads_share_one_attempt() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));
    let key: QueryKey<usize> = QueryKey::new(compose_key(
        "nodes",
        "summary",
        &QueryParams::new().with("limit", 25_u32),
    ));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        let barrier = Arc::clone(&barrier);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache
                .fetch(
                    &key,
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, FetchError>(7_usize)
                    },
                    FetchOptions::stale_for(Duration::from_secs(30)),
                )
                .await
        }));
    }

    for handle in handles {
        let value = handle.await.expect("task joins").expect("fetch succeeds");
        assert_eq!(*value, 7);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn observers_of_one_key_share_the_entry() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let first = QueryObserver::new(
        cache.clone(),
        counted_query("shared", &calls, Duration::from_millis(10)),
    );
    let second = QueryObserver::new(
        cache.clone(),
        counted_query("shared", &calls, Duration::from_millis(10)),
    );

    let (a, b) = tokio::join!(first.settled(), second.settled());
    assert_eq!(a.data.as_deref(), Some(&1));
    assert_eq!(b.data.as_deref(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A late observer inside the stale window is served synchronously.
    let late = QueryObserver::new(
        cache,
        counted_query("shared", &calls, Duration::from_millis(10)),
    );
    let state = late.state();
    assert!(!state.is_loading);
    assert_eq!(state.data.as_deref(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn refetch_bypasses_the_stale_window() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let observer = QueryObserver::new(
        cache.clone(),
        counted_query("refetch", &calls, Duration::from_millis(5)),
    );
    observer.settled().await;

    let refreshed = observer.refetch().await.expect("refetch succeeds");
    assert_eq!(refreshed.as_deref(), Some(&2));
    assert_eq!(observer.state().data.as_deref(), Some(&2));

    let key: QueryKey<usize> = QueryKey::new("refetch");
    assert_eq!(cache.peek_data(&key).as_deref(), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn deactivated_observer_ignores_late_results_but_cache_keeps_them() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut observer = QueryObserver::new(
        cache.clone(),
        counted_query("late", &calls, Duration::from_millis(100)),
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    observer.deactivate();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let state = observer.state();
    assert!(state.data.is_none());
    assert!(!state.is_loading);

    let key: QueryKey<usize> = QueryKey::new("late");
    assert_eq!(cache.peek_data(&key).as_deref(), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn failure_surfaces_through_observer_and_keeps_data() {
    let cache = QueryCache::new();
    let key: QueryKey<u32> = QueryKey::new("flaky");
    cache
        .fetch(&key, || async { Ok::<_, FetchError>(5_u32) }, FetchOptions::default())
        .await
        .expect("seed value");

    let query = Query::new(key.clone(), || async {
        Err::<u32, FetchError>(Arc::new(Failure("boom")))
    })
    .with_options(ObserveOptions {
        stale_time: Some(Duration::ZERO),
        ..ObserveOptions::default()
    });
    let observer = QueryObserver::new(cache.clone(), query);
    let state = observer.settled().await;

    assert_eq!(state.error.map(|e| e.to_string()).as_deref(), Some("boom"));
    assert_eq!(state.data.as_deref(), Some(&5));
    assert_eq!(cache.peek_data(&key).as_deref(), Some(&5));
}

#[tokio::test(start_paused = true)]
async fn disabled_observer_never_fetches_until_enabled() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut observer = QueryObserver::new(
        cache.clone(),
        counted_query("gated", &calls, Duration::from_millis(1)).enabled(false),
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(cache.is_empty());
    assert!(!observer.state().is_loading);

    observer.observe(counted_query("gated", &calls, Duration::from_millis(1)));
    let state = observer.settled().await;
    assert_eq!(state.data.as_deref(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
