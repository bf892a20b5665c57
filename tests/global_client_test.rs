// Process-wide client registration and use.

use query_broker::prelude::*;

#[tokio::test]
async fn global_client_round_trip() {
    init_global_client(QueryOptions::default());
    assert!(is_initialized());

    let client = global_client().unwrap();
    let value: u32 = client
        .fetch_query(query_key!["global", "answer"], || async { Ok(42u32) })
        .await
        .unwrap();
    assert_eq!(value, 42);

    let cached: Option<u32> = client.get_query_data(query_key!["global", "answer"]);
    assert_eq!(cached, Some(42));
}
