//! Watch lifecycle of one `(domain, label filter)`.
//!
//! The observer is the single writer of the canonical resource set. It lists
//! every store kind the domain spans, pushes the full set to the manager,
//! then follows the merged watch streams. Any watch failure throws the
//! streams away and starts over with a relist after a bounded backoff.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::select_all;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::SubscriptionKey;
use crate::metrics::DECODE_FAILURES;
use crate::metrics::OBSERVER_RELISTS;
use crate::plugin::ResourcePlugin;
use crate::plugin::ResourceSet;
use crate::store::ResourceItem;
use crate::store::ResourceStore;
use crate::store::WatchEvent;
use crate::BackoffPolicy;
use crate::Error;
use crate::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Init,
    Listing,
    Watching,
    Closed,
}

impl fmt::Display for ObserverState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            ObserverState::Init => "INIT",
            ObserverState::Listing => "LISTING",
            ObserverState::Watching => "WATCHING",
            ObserverState::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// Why a list/watch round ended
#[derive(Debug)]
enum Interruption {
    /// Store failure; relist after backoff
    Failed(Error),
    /// The manager dropped its receiver; nothing left to observe for
    ManagerGone,
}

impl From<Error> for Interruption {
    fn from(e: Error) -> Self {
        Interruption::Failed(e)
    }
}

/// Identity of one logical resource across events
type ResourceId = (String, String);

pub struct Observer<P: ResourcePlugin> {
    domain: String,
    key: SubscriptionKey,
    plugin: Arc<P>,
    store: Arc<dyn ResourceStore>,
    backoff: BackoffPolicy,
    resources: BTreeMap<ResourceId, P::Value>,
    updates: mpsc::Sender<ResourceSet<P::Value>>,
    state: watch::Sender<ObserverState>,
    cancel: CancellationToken,
}

impl<P: ResourcePlugin> Observer<P> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        domain: String,
        key: SubscriptionKey,
        plugin: Arc<P>,
        store: Arc<dyn ResourceStore>,
        backoff: BackoffPolicy,
        updates: mpsc::Sender<ResourceSet<P::Value>>,
        state: watch::Sender<ObserverState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            domain,
            key,
            plugin,
            store,
            backoff,
            resources: BTreeMap::new(),
            updates,
            state,
            cancel,
        }
    }

    fn set_state(
        &self,
        state: ObserverState,
    ) {
        trace!(domain = %self.domain, key = %self.key, %state, "observer state");
        self.state.send_replace(state);
    }

    /// Runs list/watch rounds until cancelled or the manager goes away.
    pub(crate) async fn run(mut self) {
        let cancel = self.cancel.clone();
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.observe(&mut attempt) => outcome,
            };

            match outcome {
                Interruption::ManagerGone => {
                    debug!(domain = %self.domain, key = %self.key, "manager gone, observer exiting");
                    break;
                }
                Interruption::Failed(e) => {
                    let delay = self.backoff.jittered_delay_for(attempt);
                    attempt = attempt.saturating_add(1);
                    warn!(
                        domain = %self.domain,
                        key = %self.key,
                        ?delay,
                        attempt,
                        "observation interrupted, relisting: {}", e
                    );
                    OBSERVER_RELISTS.with_label_values(&[&self.domain]).inc();

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(ObserverState::Closed);
        info!(domain = %self.domain, key = %self.key, "observer closed");
    }

    /// One LISTING -> WATCHING round. Only returns on interruption.
    async fn observe(
        &mut self,
        attempt: &mut u32,
    ) -> Interruption {
        self.set_state(ObserverState::Listing);

        let mut cursors = Vec::with_capacity(self.plugin.kinds().len());
        let mut fresh = BTreeMap::new();
        for kind in self.plugin.kinds() {
            let list = match self.store.list(kind, &self.key.labels).await {
                Ok(list) => list,
                Err(e) => return e.into(),
            };
            for item in &list.items {
                if let Some(value) = self.decode(item) {
                    fresh.insert(resource_id(item), value);
                }
            }
            cursors.push((*kind, list.resource_version));
        }

        // Replaced only once every kind listed, so a failed relist never
        // exposes a partial set.
        self.resources = fresh;
        debug!(domain = %self.domain, key = %self.key, resources = self.resources.len(), "listed");
        if let Err(interruption) = self.publish().await {
            return interruption;
        }

        let mut streams = Vec::with_capacity(cursors.len());
        for (kind, resource_version) in cursors {
            match self.store.watch(kind, &self.key.labels, &resource_version).await {
                Ok(stream) => streams.push(stream.map(move |event| (kind, event)).boxed()),
                Err(e) => return e.into(),
            }
        }
        let mut events = select_all(streams);
        self.set_state(ObserverState::Watching);

        loop {
            let Some((kind, event)) = events.next().await else {
                return Error::from(StoreError::WatchError {
                    kind: self.plugin.kinds().join(","),
                    reason: "watch stream ended".into(),
                })
                .into();
            };

            let event = match event {
                Ok(WatchEvent::Error(reason)) => {
                    return Error::from(StoreError::WatchError {
                        kind: kind.to_string(),
                        reason,
                    })
                    .into();
                }
                Ok(event) => event,
                Err(e) => return e.into(),
            };

            trace!(
                domain = %self.domain,
                action = %event.action(),
                kind,
                name = event.item().map(|item| item.name.as_str()).unwrap_or_default(),
                "watch event"
            );
            self.apply(event);
            if let Err(interruption) = self.publish().await {
                return interruption;
            }
            *attempt = 0;
        }
    }

    /// Remove-then-reinsert keeps at most one value per (kind, name) whatever
    /// the event order.
    fn apply(
        &mut self,
        event: WatchEvent,
    ) {
        let (item, deleted) = match event {
            WatchEvent::Added(item) | WatchEvent::Modified(item) => (item, false),
            WatchEvent::Deleted(item) => (item, true),
            WatchEvent::Error(_) => return,
        };

        let id = resource_id(&item);
        self.resources.remove(&id);
        if deleted {
            return;
        }
        if let Some(value) = self.decode(&item) {
            self.resources.insert(id, value);
        }
    }

    fn decode(
        &self,
        item: &ResourceItem,
    ) -> Option<P::Value> {
        if !self.key.matches_annotations(item) {
            return None;
        }
        match self.plugin.decode(item) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(domain = %self.domain, "dropping undecodable item: {}", e);
                DECODE_FAILURES.with_label_values(&[&self.domain]).inc();
                None
            }
        }
    }

    async fn publish(&self) -> Result<(), Interruption> {
        let set: ResourceSet<P::Value> = self.resources.values().cloned().collect();
        self.updates.send(set).await.map_err(|_| Interruption::ManagerGone)
    }
}

fn resource_id(item: &ResourceItem) -> ResourceId {
    (item.kind.clone(), item.name.clone())
}
