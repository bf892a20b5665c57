// Observer behavior: first-load vs background-refresh flags, selectors,
// enabled gating, and forced refetch.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use query_broker::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test(start_paused = true)]
async fn first_load_exposes_loading_then_success() {
    init_tracing();
    let client = QueryClient::new();
    let observer = QueryObserver::new(
        &client,
        query_key!["tasks"],
        || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, QueryError>(vec![1u32, 2])
        },
        ObserverOptions::default(),
    );

    let mut updates = observer.updates();
    while !observer.view().is_fetching {
        updates.changed().await.unwrap();
    }

    let view = observer.view();
    assert!(view.is_loading);
    assert!(view.is_fetching);
    assert!(view.data.is_none());

    while observer.view().is_fetching {
        updates.changed().await.unwrap();
    }

    let view = observer.view();
    assert!(view.is_success);
    assert!(!view.is_loading);
    assert_eq!(view.data, Some(vec![1, 2]));
    assert!(view.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn background_refetch_keeps_serving_stale_data() {
    let client = QueryClient::with_defaults(QueryOptions::NEVER_STALE);
    client.set_query_data(query_key!["board"], vec![1u32]);

    let observer = QueryObserver::new(
        &client,
        query_key!["board"],
        || async { Ok(vec![0u32]) },
        ObserverOptions::default(),
    );

    // The entry is fresh, so construction served from cache. Force a refetch
    // from the side and watch the observer report it.
    tokio::spawn({
        let client = client.clone();
        async move {
            let _: QueryResult<Vec<u32>> = client
                .refetch_query(query_key!["board"], || async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(vec![2u32])
                })
                .await;
        }
    });

    let mut updates = observer.updates();
    while !observer.view().is_fetching {
        updates.changed().await.unwrap();
    }

    let view = observer.view();
    assert!(view.is_fetching);
    assert!(!view.is_loading);
    assert_eq!(view.data, Some(vec![1]));

    while observer.view().is_fetching {
        updates.changed().await.unwrap();
    }
    assert_eq!(observer.view().data, Some(vec![2]));
}

#[tokio::test]
async fn selector_derives_the_view() {
    let client = QueryClient::new();
    client.set_query_data(
        query_key!["names"],
        vec!["alice".to_string(), "bob".to_string()],
    );

    let observer = QueryObserver::with_select(
        &client,
        query_key!["names"],
        || async { Ok(vec!["alice".to_string()]) },
        ObserverOptions {
            enabled: false,
            stale_time: None,
        },
        |names: Vec<String>| Ok(names.len()),
    );

    let view = observer.view();
    assert!(view.is_success);
    assert_eq!(view.data, Some(2));
}

#[tokio::test]
async fn selector_failure_hides_data_without_erroring() {
    init_tracing();
    let client = QueryClient::new();
    client.set_query_data(query_key!["names"], vec!["alice".to_string()]);

    let observer = QueryObserver::with_select(
        &client,
        query_key!["names"],
        || async { Ok(vec![]) },
        ObserverOptions {
            enabled: false,
            stale_time: None,
        },
        |_names: Vec<String>| Err::<usize, _>(QueryError::Generic("bad select".to_string())),
    );

    let view = observer.view();
    assert_eq!(view.data, None);
    assert!(view.is_success);
    assert!(view.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn disabled_observer_still_observes_external_writes() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let observer = QueryObserver::new(
        &client,
        query_key!["gated"],
        {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(5u32) }
            }
        },
        ObserverOptions {
            enabled: false,
            stale_time: None,
        },
    );

    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(observer.view().status.is_idle());
    assert!(!observer.is_enabled());

    // External writes flow through the live subscription
    let updates = observer.updates();
    client.set_query_data(query_key!["gated"], 3u32);
    assert!(updates.has_changed().unwrap());
    assert_eq!(observer.view().data, Some(3));

    // Flipping to enabled triggers the fetch
    observer.set_enabled(true);
    let mut updates = observer.updates();
    while observer.view().is_fetching || calls.load(Ordering::SeqCst) == 0 {
        updates.changed().await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(observer.view().data, Some(5));
}

#[tokio::test]
async fn refetch_bypasses_freshness() {
    let client = QueryClient::with_defaults(QueryOptions::NEVER_STALE);
    let calls = Arc::new(AtomicUsize::new(0));

    let observer = QueryObserver::new(
        &client,
        query_key!["r"],
        {
            let calls = Arc::clone(&calls);
            move || {
                let run = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(run) }
            }
        },
        ObserverOptions::default(),
    );

    let mut updates = observer.updates();
    while !observer.view().status.is_success() {
        updates.changed().await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let value = observer.refetch().await.unwrap();
    assert_eq!(value, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(observer.view().data, Some(2));
}
