use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::IdleHook;
use super::ManagerCommand;
use super::Observer;
use super::ObserverState;
use super::SubscriptionKey;
use super::SubscriptionManager;
use crate::metrics::REGISTRY_ENTRIES;
use crate::plugin::ResourcePlugin;
use crate::store::ResourceStore;
use crate::BackoffPolicy;

pub type EntryId = u64;

/// Everything a plugin needs to start the observer/manager pair of an entry
pub struct EntryContext {
    pub(crate) id: EntryId,
    pub(crate) domain: String,
    pub(crate) key: SubscriptionKey,
    pub(crate) store: Arc<dyn ResourceStore>,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) update_channel_size: usize,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) on_idle: IdleHook,
}

/// Type-erased plugin held by the registry.
///
/// Implemented for every [`ResourcePlugin`], so the registry can start a
/// correctly typed observer/manager pair without knowing the value type.
pub trait DomainPlugin: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;

    fn kinds(&self) -> &'static [&'static str];

    /// Spawns the observer and manager tasks of a new registry entry.
    fn open_entry(
        self: Arc<Self>,
        ctx: EntryContext,
    ) -> RegistryEntry;
}

impl<P: ResourcePlugin> DomainPlugin for P {
    fn type_name(&self) -> &'static str {
        P::TYPE_NAME
    }

    fn kinds(&self) -> &'static [&'static str] {
        ResourcePlugin::kinds(self)
    }

    fn open_entry(
        self: Arc<Self>,
        ctx: EntryContext,
    ) -> RegistryEntry {
        let EntryContext {
            id,
            domain,
            key,
            store,
            backoff,
            update_channel_size,
            idle_timeout,
            on_idle,
        } = ctx;

        let cancel = CancellationToken::new();
        let (update_tx, update_rx) = mpsc::channel(update_channel_size);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ObserverState::Init);

        let manager = SubscriptionManager::new(domain.clone(), key.clone(), self.clone());
        let subscriber_count = manager.subscriber_count_handle();
        let observer = Observer::new(
            domain.clone(),
            key.clone(),
            self,
            store,
            backoff,
            update_tx,
            state_tx,
            cancel.clone(),
        );

        tokio::spawn(manager.run(update_rx, command_rx, cancel.clone(), idle_timeout, on_idle));
        tokio::spawn(observer.run());

        REGISTRY_ENTRIES.with_label_values(&[&domain]).inc();
        debug!(entry_id = id, domain = %domain, key = %key, "registry entry opened");

        RegistryEntry {
            id,
            domain,
            key,
            commands: command_tx,
            refs: Arc::new(AtomicUsize::new(0)),
            subscriber_count,
            state: state_rx,
            cancel,
        }
    }
}

/// The observer/manager pair of one `(domain, key)`.
///
/// Dropping the entry cancels both tasks; the observer releases its watch
/// streams as it exits.
pub struct RegistryEntry {
    pub(crate) id: EntryId,
    domain: String,
    key: SubscriptionKey,
    pub(crate) commands: mpsc::UnboundedSender<ManagerCommand>,
    /// Live guards, maintained under the registry map lock on subscribe
    pub(crate) refs: Arc<AtomicUsize>,
    subscriber_count: Arc<AtomicUsize>,
    state: watch::Receiver<ObserverState>,
    cancel: CancellationToken,
}

impl RegistryEntry {
    pub fn observer_state(&self) -> watch::Receiver<ObserverState> {
        self.state.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.refs.load(Ordering::SeqCst) == 0
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("key", &format_args!("{}", self.key))
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Drop for RegistryEntry {
    fn drop(&mut self) {
        self.cancel.cancel();
        REGISTRY_ENTRIES.with_label_values(&[&self.domain]).dec();
        debug!(entry_id = self.id, domain = %self.domain, key = %self.key, "registry entry closed");
    }
}
