use configserv::subscription::SubscriptionKey;
use serde_json::json;

use crate::commons::address;
use crate::commons::assert_quiet;
use crate::commons::json_body;
use crate::commons::next_snapshot;
use crate::commons::TestServer;
use crate::enable_logger;

#[tokio::test]
async fn test_address_flags_are_published_per_name() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();

    let mut stream = client.subscribe("v1/addresses", &SubscriptionKey::default()).await.unwrap();
    server.store.apply(address("queue-a", "s1", json!({"store_and_forward": "true"})));

    let snapshot = next_snapshot(&mut stream).await;
    assert_eq!(
        json_body(&snapshot),
        json!({"queue-a": {"store_and_forward": true, "multicast": false}})
    );

    server.store.apply(address(
        "topic-b",
        "s1",
        json!({"json": r#"{"store_and_forward": false, "multicast": true}"#}),
    ));

    let snapshot = next_snapshot(&mut stream).await;
    assert_eq!(
        json_body(&snapshot),
        json!({
            "queue-a": {"store_and_forward": true, "multicast": false},
            "topic-b": {"store_and_forward": false, "multicast": true}
        })
    );

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_annotation_filter_selects_address_space() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();
    let key = SubscriptionKey::default().with_annotation("address-space", "s1");

    let mut stream = client.subscribe("v1/addresses", &key).await.unwrap();
    server.store.apply(address("other", "s2", json!({"multicast": "true"})));
    assert_quiet(&mut stream).await;

    server.store.apply(address("mine", "s1", json!({"multicast": "true"})));

    let snapshot = next_snapshot(&mut stream).await;
    assert_eq!(
        json_body(&snapshot),
        json!({"mine": {"store_and_forward": false, "multicast": true}})
    );

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_undecodable_address_is_skipped() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();

    let mut stream = client.subscribe("v1/addresses", &SubscriptionKey::default()).await.unwrap();
    server.store.apply(address("broken", "s1", json!({"multicast": "sometimes"})));
    server.store.apply(address("good", "s1", json!({"multicast": "false"})));

    let snapshot = next_snapshot(&mut stream).await;
    assert_eq!(
        json_body(&snapshot),
        json!({"good": {"store_and_forward": false, "multicast": false}})
    );

    server.shutdown().await.unwrap();
}
