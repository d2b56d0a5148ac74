use configserv::subscription::SubscriptionKey;

use crate::commons::assert_quiet;
use crate::commons::json_body;
use crate::commons::next_snapshot;
use crate::commons::pod;
use crate::commons::wait_for;
use crate::commons::TestServer;
use crate::enable_logger;

#[tokio::test]
async fn test_links_with_same_key_share_one_entry() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let key = SubscriptionKey::default().with_label("app", "x");

    let mut streams = Vec::new();
    for _ in 0..3 {
        let mut client = server.client().await.unwrap();
        streams.push(client.subscribe("podsense", &key).await.unwrap());
    }
    wait_for("three subscribers", || server.database.subscriber_count("podsense", &key) == 3).await;
    assert_eq!(server.database.entry_count(), 1);

    server.store.apply(pod("P1", "x", "10.0.0.1", "Running"));

    let mut payloads = Vec::new();
    for stream in streams.iter_mut() {
        let snapshot = next_snapshot(stream).await;
        assert_eq!(snapshot.sequence, 1);
        payloads.push(snapshot.payload);
    }
    assert!(payloads.windows(2).all(|w| w[0] == w[1]));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_links_on_one_connection_are_independent() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();
    let key = SubscriptionKey::default();

    let mut first = client.subscribe("podsense", &key).await.unwrap();
    let mut second = client.clone().subscribe("podsense", &key).await.unwrap();
    server.store.apply(pod("P1", "x", "10.0.0.1", "Running"));

    assert_eq!(next_snapshot(&mut first).await.payload, next_snapshot(&mut second).await.payload);

    drop(first);
    server.store.apply(pod("P2", "x", "10.0.0.2", "Running"));

    let snapshot = next_snapshot(&mut second).await;
    assert_eq!(json_body(&snapshot).as_array().unwrap().len(), 2);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_different_keys_are_isolated() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();
    let key_x = SubscriptionKey::default().with_label("app", "x");
    let key_y = SubscriptionKey::default().with_label("app", "y");

    let mut stream_x = client.subscribe("podsense", &key_x).await.unwrap();
    let mut stream_y = client.subscribe("podsense", &key_y).await.unwrap();
    assert_eq!(server.database.entry_count(), 2);

    server.store.apply(pod("P1", "y", "10.0.0.1", "Running"));

    let snapshot = next_snapshot(&mut stream_y).await;
    assert_eq!(json_body(&snapshot)[0]["name"], "P1");
    assert_quiet(&mut stream_x).await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_late_joiner_receives_current_snapshot() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let key = SubscriptionKey::default();

    let mut early_client = server.client().await.unwrap();
    let mut early = early_client.subscribe("podsense", &key).await.unwrap();
    server.store.apply(pod("P1", "x", "10.0.0.1", "Running"));
    let expected = next_snapshot(&mut early).await;

    let mut late_client = server.client().await.unwrap();
    let mut late = late_client.subscribe("podsense", &key).await.unwrap();
    let replayed = next_snapshot(&mut late).await;

    assert_eq!(replayed.sequence, 1);
    assert_eq!(replayed.payload, expected.payload);
    assert_quiet(&mut early).await;

    server.shutdown().await.unwrap();
}
