use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::plugin::Payload;
use crate::subscription::mailbox;
use crate::subscription::ManagerCommand;
use crate::subscription::Subscriber;
use crate::subscription::SubscriptionGuard;
use crate::subscription::SubscriptionKey;

struct Harness {
    commands: mpsc::UnboundedReceiver<ManagerCommand>,
    refs: Arc<AtomicUsize>,
}

fn handler_with_mailbox() -> (LinkHandler, Arc<crate::subscription::MailboxSubscriber>, Harness) {
    let (subscriber, mailbox) = mailbox();
    let (tx, commands) = mpsc::unbounded_channel();
    let refs = Arc::new(AtomicUsize::new(1));
    let guard = SubscriptionGuard::new(
        subscriber.id(),
        "podsense".into(),
        SubscriptionKey::default(),
        tx,
        refs.clone(),
    );
    let handler = LinkHandler::new("link-1".into(), "podsense".into(), mailbox, guard);
    (handler, subscriber, Harness { commands, refs })
}

fn payload(body: &str) -> Payload {
    Payload::json(body.as_bytes().to_vec())
}

#[tokio::test]
async fn test_snapshots_are_numbered_per_link() {
    let (handler, subscriber, _harness) = handler_with_mailbox();
    let (tx, mut rx) = mpsc::channel(4);
    tokio::spawn(handler.run(tx));

    subscriber.push(payload("[1]")).unwrap();
    let first = rx.recv().await.unwrap().unwrap();
    subscriber.push(payload("[2]")).unwrap();
    let second = rx.recv().await.unwrap().unwrap();

    assert_eq!(first.sequence, 1);
    assert_eq!(first.address, "podsense");
    assert_eq!(first.content_type, "application/json");
    assert_eq!(first.payload, b"[1]");
    assert_eq!(second.sequence, 2);
}

#[tokio::test]
async fn test_client_close_unsubscribes() {
    let (handler, _subscriber, mut harness) = handler_with_mailbox();
    let (tx, rx) = mpsc::channel(4);
    let task = tokio::spawn(handler.run(tx));

    drop(rx);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    assert_eq!(harness.refs.load(Ordering::SeqCst), 0);
    assert!(matches!(harness.commands.try_recv(), Ok(ManagerCommand::Unsubscribe(_))));
}

#[tokio::test]
async fn test_server_release_ends_stream_with_unavailable() {
    let (handler, subscriber, _harness) = handler_with_mailbox();
    let (tx, mut rx) = mpsc::channel(4);
    tokio::spawn(handler.run(tx));

    drop(subscriber);

    let status = rx.recv().await.unwrap().unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unavailable);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_slow_link_skips_to_latest_snapshot() {
    let (handler, subscriber, _harness) = handler_with_mailbox();
    let (tx, mut rx) = mpsc::channel(1);
    tokio::spawn(handler.run(tx));

    subscriber.push(payload("[1]")).unwrap();
    // Give the handler time to fill the one-slot response buffer.
    tokio::time::sleep(Duration::from_millis(20)).await;
    subscriber.push(payload("[2]")).unwrap();
    subscriber.push(payload("[3]")).unwrap();
    subscriber.push(payload("[4]")).unwrap();

    let first = rx.recv().await.unwrap().unwrap();
    assert_eq!(first.payload, b"[1]");

    let mut last = Vec::new();
    while let Ok(Some(Ok(snapshot))) = timeout(Duration::from_millis(100), rx.recv()).await {
        last = snapshot.payload;
    }
    assert_eq!(last, b"[4]");
}

#[test]
fn test_link_state_display() {
    assert_eq!(LinkState::Rejected.to_string(), "REJECTED");
    assert_eq!(LinkState::Subscribed.to_string(), "SUBSCRIBED");
}
