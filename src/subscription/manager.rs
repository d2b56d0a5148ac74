//! Single source of truth for the externally visible snapshot of one key.

use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ManagerCommand;
use super::Subscriber;
use super::SubscriberId;
use super::SubscriptionKey;
use crate::metrics::ACTIVE_SUBSCRIBERS;
use crate::metrics::SNAPSHOTS_BROADCAST;
use crate::plugin::Payload;
use crate::plugin::ResourcePlugin;
use crate::plugin::ResourceSet;

/// Called when a manager has been idle for the configured timeout. Returns
/// true if the owning registry entry was removed and the manager must stop.
pub(crate) type IdleHook = Box<dyn Fn() -> bool + Send + Sync>;

/// Holds the last broadcast set of one key and fans it out.
///
/// Every method is synchronous. Serialization is provided by the owner: the
/// manager task in production, the test body in unit tests.
pub struct SubscriptionManager<P: ResourcePlugin> {
    domain: String,
    key: SubscriptionKey,
    plugin: Arc<P>,
    current: ResourceSet<P::Value>,
    last_payload: Option<Payload>,
    /// Registration order
    subscribers: Vec<Arc<dyn Subscriber>>,
    subscriber_count: Arc<AtomicUsize>,
}

impl<P: ResourcePlugin> fmt::Debug for SubscriptionManager<P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("domain", &self.domain)
            .field("key", &format_args!("{}", self.key))
            .field("resources", &self.current.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<P: ResourcePlugin> SubscriptionManager<P> {
    pub fn new(
        domain: impl Into<String>,
        key: SubscriptionKey,
        plugin: Arc<P>,
    ) -> Self {
        Self {
            domain: domain.into(),
            key,
            plugin,
            current: ResourceSet::new(),
            last_payload: None,
            subscribers: Vec::new(),
            subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter mirroring the number of registered subscribers
    pub(crate) fn subscriber_count_handle(&self) -> Arc<AtomicUsize> {
        self.subscriber_count.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn current(&self) -> &ResourceSet<P::Value> {
        &self.current
    }

    pub fn last_payload(&self) -> Option<&Payload> {
        self.last_payload.as_ref()
    }

    /// Offers a full candidate set.
    ///
    /// Applies the plugin filter and broadcasts only if the filtered set
    /// differs from the one held. Returns whether a broadcast happened. An
    /// encode failure keeps the previous set and payload.
    pub fn resources_updated(
        &mut self,
        candidate: impl IntoIterator<Item = P::Value>,
    ) -> bool {
        let filtered: ResourceSet<P::Value> =
            candidate.into_iter().filter(|v| self.plugin.filter(v)).collect();

        if filtered == self.current {
            trace!(domain = %self.domain, key = %self.key, "unchanged resource set ignored");
            return false;
        }

        let payload = match self.plugin.encode(&filtered) {
            Ok(payload) => payload,
            Err(e) => {
                error!(domain = %self.domain, key = %self.key, "encode failed, update dropped: {:?}", e);
                return false;
            }
        };

        debug!(
            domain = %self.domain,
            key = %self.key,
            resources = filtered.len(),
            subscribers = self.subscribers.len(),
            "broadcasting snapshot"
        );
        self.current = filtered;
        self.last_payload = Some(payload.clone());
        SNAPSHOTS_BROADCAST.with_label_values(&[&self.domain]).inc();

        let before = self.subscribers.len();
        let domain = &self.domain;
        self.subscribers.retain(|subscriber| match subscriber.push(payload.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(domain = %domain, subscriber_id = subscriber.id(), "dropping subscriber: {}", e);
                false
            }
        });
        self.record_removed(before - self.subscribers.len());
        true
    }

    /// Registers a subscriber, replaying the last broadcast if the held set is
    /// non-empty.
    pub fn subscribe(
        &mut self,
        subscriber: Arc<dyn Subscriber>,
    ) {
        let id = subscriber.id();
        if self.subscribers.iter().any(|s| s.id() == id) {
            warn!(domain = %self.domain, subscriber_id = id, "subscriber already registered");
            return;
        }

        if !self.current.is_empty() {
            if let Some(payload) = &self.last_payload {
                if let Err(e) = subscriber.push(payload.clone()) {
                    warn!(domain = %self.domain, subscriber_id = id, "replay failed: {}", e);
                    return;
                }
            }
        }

        debug!(domain = %self.domain, key = %self.key, subscriber_id = id, "subscriber registered");
        self.subscribers.push(subscriber);
        self.subscriber_count.store(self.subscribers.len(), Ordering::SeqCst);
        ACTIVE_SUBSCRIBERS.with_label_values(&[&self.domain]).inc();
    }

    /// Returns whether the subscriber was registered.
    pub fn unsubscribe(
        &mut self,
        id: SubscriberId,
    ) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id() != id);
        let removed = before - self.subscribers.len();
        self.record_removed(removed);
        if removed > 0 {
            debug!(domain = %self.domain, key = %self.key, subscriber_id = id, "subscriber unregistered");
        }
        removed > 0
    }

    fn record_removed(
        &self,
        removed: usize,
    ) {
        if removed == 0 {
            return;
        }
        self.subscriber_count.store(self.subscribers.len(), Ordering::SeqCst);
        ACTIVE_SUBSCRIBERS.with_label_values(&[&self.domain]).sub(removed as i64);
    }

    fn apply_command(
        &mut self,
        command: ManagerCommand,
    ) {
        match command {
            ManagerCommand::Subscribe(subscriber) => self.subscribe(subscriber),
            ManagerCommand::Unsubscribe(id) => {
                self.unsubscribe(id);
            }
        }
    }

    /// Drives the manager until cancelled, the observer goes away, or the
    /// entry is torn down after idling.
    ///
    /// Updates and commands are handled one at a time, which serializes every
    /// mutation of this key's state.
    pub(crate) async fn run(
        mut self,
        mut updates: mpsc::Receiver<ResourceSet<P::Value>>,
        mut commands: mpsc::UnboundedReceiver<ManagerCommand>,
        cancel: CancellationToken,
        idle_timeout: Option<Duration>,
        on_idle: IdleHook,
    ) {
        let mut idle_deadline: Option<Instant> = None;

        loop {
            idle_deadline = match idle_timeout {
                Some(timeout) if self.subscribers.is_empty() => {
                    Some(idle_deadline.unwrap_or_else(|| Instant::now() + timeout))
                }
                _ => None,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(domain = %self.domain, key = %self.key, "manager cancelled");
                    break;
                }
                Some(command) = commands.recv() => {
                    trace!(domain = %self.domain, ?command, "manager command");
                    self.apply_command(command);
                }
                update = updates.recv() => match update {
                    Some(candidate) => {
                        self.resources_updated(candidate);
                    }
                    None => {
                        debug!(domain = %self.domain, key = %self.key, "observer stopped, manager exiting");
                        break;
                    }
                },
                _ = sleep_until_deadline(idle_deadline) => {
                    if on_idle() {
                        info!(domain = %self.domain, key = %self.key, "idle registry entry torn down");
                        break;
                    }
                    // A subscribe raced the timeout and its command is queued.
                    idle_deadline = None;
                }
            }
        }

        cancel.cancel();
        let remaining = self.subscribers.len();
        self.subscribers.clear();
        self.record_removed(remaining);
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
