use configserv::subscription::SubscriptionKey;

use crate::commons::next_snapshot;
use crate::commons::pod;
use crate::commons::test_settings;
use crate::commons::wait_for;
use crate::commons::TestServer;
use crate::enable_logger;

#[tokio::test]
async fn test_cancelled_link_unsubscribes() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();
    let key = SubscriptionKey::default();

    let stream = client.subscribe("podsense", &key).await.unwrap();
    wait_for("subscriber registered", || server.database.subscriber_count("podsense", &key) == 1)
        .await;

    drop(stream);
    wait_for("subscriber removed", || server.database.subscriber_count("podsense", &key) == 0).await;

    // Idle teardown is off by default, the entry stays.
    assert_eq!(server.database.entry_count(), 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_idle_entry_is_torn_down_and_recreated() {
    enable_logger();
    let mut settings = test_settings();
    settings.subscription.idle_entry_timeout_ms = 50;
    let server = TestServer::start_with_settings(settings).await.unwrap();
    let mut client = server.client().await.unwrap();
    let key = SubscriptionKey::default();

    server.store.apply(pod("P1", "x", "10.0.0.1", "Running"));
    let mut stream = client.subscribe("podsense", &key).await.unwrap();
    next_snapshot(&mut stream).await;

    drop(stream);
    wait_for("idle entry removed", || server.database.entry_count() == 0).await;
    wait_for("observer watch released", || server.store.open_watch_count() == 0).await;

    let mut stream = client.subscribe("podsense", &key).await.unwrap();
    let snapshot = next_snapshot(&mut stream).await;
    assert_eq!(snapshot.sequence, 1);
    assert_eq!(server.database.entry_count(), 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_ends_open_links() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();

    let mut stream = client.subscribe("podsense", &SubscriptionKey::default()).await.unwrap();
    server.store.apply(pod("P1", "x", "10.0.0.1", "Running"));
    next_snapshot(&mut stream).await;

    let database = server.database.clone();
    server.shutdown().await.unwrap();

    assert!(database.is_closed());
    assert_eq!(database.entry_count(), 0);
    let ended = tokio::time::timeout(std::time::Duration::from_secs(5), stream.message())
        .await
        .expect("link ends after shutdown");
    assert!(!matches!(ended, Ok(Some(_))));
}
