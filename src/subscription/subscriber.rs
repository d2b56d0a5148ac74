use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;

use super::SubscriptionKey;
use crate::plugin::Payload;
use crate::Result;
use crate::SubscriptionError;

pub type SubscriberId = u64;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique subscriber id
pub fn next_subscriber_id() -> SubscriberId {
    NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed)
}

/// One live link as seen by a manager.
///
/// `push` is called from the manager task and must never block: an
/// implementation hands the payload over to the link's own task. An error
/// means the link is gone and the manager drops the subscriber.
#[cfg_attr(test, automock)]
pub trait Subscriber: Send + Sync + 'static {
    fn id(&self) -> SubscriberId;

    fn push(
        &self,
        payload: Payload,
    ) -> Result<()>;
}

/// Commands serialized through a manager task
pub enum ManagerCommand {
    Subscribe(Arc<dyn Subscriber>),
    Unsubscribe(SubscriberId),
}

impl fmt::Debug for ManagerCommand {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ManagerCommand::Subscribe(s) => write!(f, "Subscribe({})", s.id()),
            ManagerCommand::Unsubscribe(id) => write!(f, "Unsubscribe({id})"),
        }
    }
}

/// Latest-wins mailbox sender half.
///
/// A push replaces any payload the link has not taken yet, so a slow link
/// skips intermediate snapshots and never holds back the manager.
#[derive(Debug)]
pub struct MailboxSubscriber {
    id: SubscriberId,
    sender: watch::Sender<Option<Payload>>,
}

/// Receiving half owned by the link task
#[derive(Debug)]
pub struct Mailbox {
    receiver: watch::Receiver<Option<Payload>>,
}

/// Creates a subscriber with a fresh id and the mailbox it delivers into.
pub fn mailbox() -> (Arc<MailboxSubscriber>, Mailbox) {
    let (sender, receiver) = watch::channel(None);
    let subscriber = MailboxSubscriber {
        id: next_subscriber_id(),
        sender,
    };
    (Arc::new(subscriber), Mailbox { receiver })
}

impl Subscriber for MailboxSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn push(
        &self,
        payload: Payload,
    ) -> Result<()> {
        self.sender
            .send(Some(payload))
            .map_err(|_| SubscriptionError::PushFailed { subscriber_id: self.id }.into())
    }
}

impl Mailbox {
    /// Waits for the next undelivered payload.
    ///
    /// Returns `None` once the subscriber half is dropped and every payload
    /// has been taken, i.e. the manager let go of this link.
    pub async fn recv(&mut self) -> Option<Payload> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(payload) = self.receiver.borrow_and_update().clone() {
                return Some(payload);
            }
        }
    }
}

/// Keeps one subscriber registered.
///
/// Dropping the guard unregisters the subscriber from its manager.
pub struct SubscriptionGuard {
    subscriber_id: SubscriberId,
    domain: String,
    key: SubscriptionKey,
    commands: mpsc::UnboundedSender<ManagerCommand>,
    refs: Arc<AtomicUsize>,
}

impl SubscriptionGuard {
    pub(crate) fn new(
        subscriber_id: SubscriberId,
        domain: String,
        key: SubscriptionKey,
        commands: mpsc::UnboundedSender<ManagerCommand>,
        refs: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            subscriber_id,
            domain,
            key,
            commands,
            refs,
        }
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("subscriber_id", &self.subscriber_id)
            .field("domain", &self.domain)
            .field("key", &format_args!("{}", self.key))
            .finish()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.refs.fetch_sub(1, Ordering::SeqCst);
        // The manager may already be gone after registry close.
        let _ = self.commands.send(ManagerCommand::Unsubscribe(self.subscriber_id));
        debug!(
            domain = %self.domain,
            key = %self.key,
            subscriber_id = self.subscriber_id,
            "subscription released"
        );
    }
}
