// Mutation lifecycle: explicit awaiting, fire-and-forget dispatch, callback
// ordering, and reset.

use std::sync::{Arc, Mutex};

use query_broker::prelude::*;
use tokio::sync::Notify;

#[tokio::test]
async fn success_runs_callbacks_in_order() {
    let events = Arc::new(Mutex::new(Vec::new()));

    let mutation = Mutation::new(|name: String| async move { Ok(format!("saved {name}")) })
        .on_success({
            let events = Arc::clone(&events);
            move |data: &String, variables: &String| {
                events
                    .lock()
                    .unwrap()
                    .push(format!("success {data} for {variables}"));
            }
        })
        .on_settled({
            let events = Arc::clone(&events);
            move |data: Option<&String>, error: Option<&QueryError>, _variables: &String| {
                assert!(error.is_none());
                events
                    .lock()
                    .unwrap()
                    .push(format!("settled {}", data.unwrap()));
            }
        });

    assert!(mutation.is_idle());

    let result = mutation.mutate_async("droplet".to_string()).await.unwrap();
    assert_eq!(result, "saved droplet");
    assert!(mutation.is_success());
    assert_eq!(mutation.data(), Some("saved droplet".to_string()));
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "success saved droplet for droplet".to_string(),
            "settled saved droplet".to_string(),
        ]
    );
}

#[tokio::test]
async fn failure_is_stored_and_returned() {
    let mutation = Mutation::new(|_: ()| async move {
        Err::<u32, _>(QueryError::Generic("boom".to_string()))
    });

    let error = mutation.mutate_async(()).await.unwrap_err();
    assert_eq!(error, QueryError::Generic("boom".to_string()));
    assert!(mutation.is_error());
    assert!(!mutation.is_loading());
    assert_eq!(mutation.error(), Some(QueryError::Generic("boom".to_string())));
    assert_eq!(mutation.data(), None);
}

#[tokio::test]
async fn failure_runs_error_then_settled() {
    let events = Arc::new(Mutex::new(Vec::new()));

    let mutation = Mutation::new(|_: u32| async move { Err::<u32, _>("nope".into()) })
        .on_error({
            let events = Arc::clone(&events);
            move |error: &QueryError, variables: &u32| {
                events.lock().unwrap().push(format!("error {error} for {variables}"));
            }
        })
        .on_settled({
            let events = Arc::clone(&events);
            move |data: Option<&u32>, error: Option<&QueryError>, _variables: &u32| {
                assert!(data.is_none());
                assert!(error.is_some());
                events.lock().unwrap().push("settled".to_string());
            }
        });

    let _ = mutation.mutate_async(9).await;
    assert_eq!(
        *events.lock().unwrap(),
        vec!["error Query error: nope for 9".to_string(), "settled".to_string()]
    );
}

#[tokio::test]
async fn mutate_reports_failures_through_callbacks() {
    let notify = Arc::new(Notify::new());

    let mutation = Mutation::new(|_: ()| async move {
        Err::<(), _>(QueryError::Timeout("slow".to_string()))
    })
    .on_error({
        let notify = Arc::clone(&notify);
        move |_error: &QueryError, _variables: &()| notify.notify_one()
    });

    mutation.mutate(());
    notify.notified().await;
    assert!(mutation.is_error());
}

#[tokio::test]
async fn reset_returns_to_idle() {
    let mutation = Mutation::new(|_: ()| async move { Ok(1u32) });

    mutation.mutate_async(()).await.unwrap();
    assert!(mutation.is_success());

    mutation.reset();
    assert!(mutation.is_idle());
    assert_eq!(mutation.data(), None);
    assert_eq!(mutation.error(), None);
}

#[tokio::test]
async fn clones_share_state() {
    let mutation = Mutation::new(|_: ()| async move { Ok(1u32) });
    let watcher = mutation.clone();

    mutation.mutate_async(()).await.unwrap();
    assert!(watcher.is_success());
    assert_eq!(watcher.data(), Some(1));
}
