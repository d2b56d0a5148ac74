use configserv::subscription::SubscriptionKey;
use configserv::Error;
use configserv::NetworkError;
use serde_json::json;
use tonic::Code;

use crate::commons::assert_quiet;
use crate::commons::json_body;
use crate::commons::next_snapshot;
use crate::commons::pod;
use crate::commons::TestServer;
use crate::enable_logger;

#[tokio::test]
async fn test_pod_snapshots_follow_store_changes() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();
    let key = SubscriptionKey::default().with_label("app", "x");

    let mut stream = client.subscribe("podsense", &key).await.unwrap();
    server.store.apply(pod("P1", "x", "10.0.0.1", "Running"));

    let first = next_snapshot(&mut stream).await;
    assert_eq!(first.sequence, 1);
    assert_eq!(first.address, "podsense");
    assert_eq!(first.content_type, "application/json");
    assert_eq!(
        json_body(&first),
        json!([{
            "name": "P1",
            "host": "10.0.0.1",
            "phase": "Running",
            "ready": false,
            "ports": {"broker": {"amqp": 5672}}
        }])
    );

    server.store.apply(pod("P1", "x", "10.0.0.1", "Failed"));

    let second = next_snapshot(&mut stream).await;
    assert_eq!(second.sequence, 2);
    assert_eq!(json_body(&second), json!([]));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unchanged_resource_is_not_rebroadcast() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();

    let mut stream = client.subscribe("podsense", &SubscriptionKey::default()).await.unwrap();
    server.store.apply(pod("P1", "x", "10.0.0.1", "Running"));
    next_snapshot(&mut stream).await;

    // Same projection, different raw object
    server.store.apply(
        pod("P1", "x", "10.0.0.1", "Running").with_annotation("touched", "yes"),
    );
    assert_quiet(&mut stream).await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_address_is_rejected_with_not_found() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    let mut client = server.client().await.unwrap();

    let err = client.subscribe("v1/unknown", &SubscriptionKey::default()).await.unwrap_err();
    match err {
        Error::Network(NetworkError::TonicStatusError(status)) => {
            assert_eq!(status.code(), Code::NotFound);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(server.database.entry_count(), 0);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deleted_pod_leaves_the_snapshot() {
    enable_logger();
    let server = TestServer::start().await.unwrap();
    server.store.apply(pod("P1", "x", "10.0.0.1", "Running"));
    server.store.apply(pod("P2", "x", "10.0.0.2", "Pending"));
    let mut client = server.client().await.unwrap();

    let mut stream = client.subscribe("podsense", &SubscriptionKey::default()).await.unwrap();
    let first = next_snapshot(&mut stream).await;
    let names: Vec<_> = json_body(&first)
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["P1", "P2"]);

    server.store.delete("Pod", "P1");

    let second = next_snapshot(&mut stream).await;
    assert_eq!(json_body(&second)[0]["name"], "P2");
    assert_eq!(json_body(&second).as_array().unwrap().len(), 1);

    server.shutdown().await.unwrap();
}
