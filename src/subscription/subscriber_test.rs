use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::plugin::Payload;
use crate::Error;
use crate::SubscriptionError;

fn payload(body: &str) -> Payload {
    Payload::json(body.as_bytes().to_vec())
}

#[tokio::test]
async fn test_mailbox_keeps_only_latest_payload() {
    let (subscriber, mut mailbox) = mailbox();
    subscriber.push(payload("[1]")).unwrap();
    subscriber.push(payload("[2]")).unwrap();

    assert_eq!(mailbox.recv().await, Some(payload("[2]")));
    assert!(timeout(Duration::from_millis(20), mailbox.recv()).await.is_err());
}

#[tokio::test]
async fn test_mailbox_drains_then_reports_closed() {
    let (subscriber, mut mailbox) = mailbox();
    subscriber.push(payload("[1]")).unwrap();
    drop(subscriber);

    assert_eq!(mailbox.recv().await, Some(payload("[1]")));
    assert_eq!(mailbox.recv().await, None);
}

#[test]
fn test_push_fails_once_mailbox_dropped() {
    let (subscriber, mailbox) = mailbox();
    drop(mailbox);

    let err = subscriber.push(payload("[]")).unwrap_err();
    assert!(matches!(
        err,
        Error::Subscription(SubscriptionError::PushFailed { subscriber_id }) if subscriber_id == subscriber.id()
    ));
}

#[test]
fn test_subscriber_ids_are_unique() {
    let (a, _ma) = mailbox();
    let (b, _mb) = mailbox();
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_guard_drop_unregisters_and_releases_reference() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let refs = Arc::new(AtomicUsize::new(1));
    let guard = SubscriptionGuard::new(
        42,
        "podsense".into(),
        SubscriptionKey::default(),
        tx,
        refs.clone(),
    );
    assert_eq!(guard.subscriber_id(), 42);
    assert_eq!(guard.domain(), "podsense");

    drop(guard);

    assert_eq!(refs.load(Ordering::SeqCst), 0);
    assert!(matches!(rx.try_recv(), Ok(ManagerCommand::Unsubscribe(42))));
}

#[test]
fn test_guard_drop_tolerates_stopped_manager() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let refs = Arc::new(AtomicUsize::new(1));
    drop(SubscriptionGuard::new(1, "d".into(), SubscriptionKey::default(), tx, refs.clone()));
    assert_eq!(refs.load(Ordering::SeqCst), 0);
}
