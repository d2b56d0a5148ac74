//! Registry of shared observer/manager pairs.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use super::EntryContext;
use super::EntryId;
use super::IdleHook;
use super::ManagerCommand;
use super::ObserverState;
use super::RegistryEntry;
use super::Subscriber;
use super::SubscriptionGuard;
use super::SubscriptionKey;
use crate::plugin::PluginRegistry;
use crate::store::ResourceStore;
use crate::BackoffPolicy;
use crate::Result;
use crate::Settings;
use crate::SubscriptionError;

type EntryKey = (String, SubscriptionKey);

struct DatabaseInner {
    plugins: PluginRegistry,
    store: Arc<dyn ResourceStore>,
    backoff: BackoffPolicy,
    update_channel_size: usize,
    idle_timeout: Option<Duration>,
    entries: DashMap<EntryKey, RegistryEntry>,
    next_entry_id: AtomicU64,
    closed: AtomicBool,
}

/// Maps `(domain, SubscriptionKey)` to its shared [`RegistryEntry`].
///
/// Entries are created lazily on the first subscribe for a key. With an idle
/// timeout configured an entry without guards is torn down after that long;
/// otherwise it lives until [`ResourceDatabase::close`].
#[derive(Clone)]
pub struct ResourceDatabase {
    inner: Arc<DatabaseInner>,
}

impl ResourceDatabase {
    pub fn new(
        plugins: PluginRegistry,
        store: Arc<dyn ResourceStore>,
        settings: &Settings,
    ) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                plugins,
                store,
                backoff: settings.retry.relist,
                update_channel_size: settings.subscription.update_channel_size,
                idle_timeout: settings.subscription.idle_entry_timeout(),
                entries: DashMap::new(),
                next_entry_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Builds the plugin registry from the configured domain bindings.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn ResourceStore>,
    ) -> Result<Self> {
        let plugins = PluginRegistry::from_bindings(&settings.domains)?;
        Ok(Self::new(plugins, store, settings))
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.inner.plugins
    }

    /// Registers `subscriber` for `(domain, key)`, creating the entry on first
    /// use. Must be called within a tokio runtime.
    pub fn subscribe(
        &self,
        domain: &str,
        key: SubscriptionKey,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<SubscriptionGuard> {
        let plugin = self
            .inner
            .plugins
            .get(domain)
            .ok_or_else(|| SubscriptionError::UnknownDomain(domain.to_string()))?;

        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SubscriptionError::DatabaseClosed.into());
        }

        let entry_key = (domain.to_string(), key.clone());
        let entry = self.inner.entries.entry(entry_key.clone()).or_insert_with(|| {
            let id = self.inner.next_entry_id.fetch_add(1, Ordering::Relaxed);
            plugin.open_entry(EntryContext {
                id,
                domain: domain.to_string(),
                key: key.clone(),
                store: self.inner.store.clone(),
                backoff: self.inner.backoff,
                update_channel_size: self.inner.update_channel_size,
                idle_timeout: self.inner.idle_timeout,
                on_idle: idle_hook(Arc::downgrade(&self.inner), entry_key.clone(), id),
            })
        });

        // A close() that slipped in before the shard lock was taken has
        // already cleared the map; drop what we just inserted.
        if self.inner.closed.load(Ordering::SeqCst) {
            drop(entry);
            self.inner.entries.remove(&entry_key);
            return Err(SubscriptionError::DatabaseClosed.into());
        }

        let subscriber_id = subscriber.id();
        entry
            .commands
            .send(ManagerCommand::Subscribe(subscriber))
            .map_err(|_| SubscriptionError::ManagerStopped {
                domain: domain.to_string(),
            })?;
        entry.refs.fetch_add(1, Ordering::SeqCst);

        debug!(domain, key = %key, subscriber_id, entry_id = entry.id, "subscribed");
        Ok(SubscriptionGuard::new(
            subscriber_id,
            domain.to_string(),
            key,
            entry.commands.clone(),
            entry.refs.clone(),
        ))
    }

    /// Closes every entry, releasing all watch streams. Later subscribes fail.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let count = self.inner.entries.len();
        self.inner.entries.clear();
        info!(entries = count, "resource database closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn entry_count(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn observer_state(
        &self,
        domain: &str,
        key: &SubscriptionKey,
    ) -> Option<watch::Receiver<ObserverState>> {
        self.inner
            .entries
            .get(&(domain.to_string(), key.clone()))
            .map(|entry| entry.observer_state())
    }

    pub fn subscriber_count(
        &self,
        domain: &str,
        key: &SubscriptionKey,
    ) -> usize {
        self.inner
            .entries
            .get(&(domain.to_string(), key.clone()))
            .map(|entry| entry.subscriber_count())
            .unwrap_or(0)
    }
}

/// Removes the entry if it is still the same incarnation and has no guards.
fn idle_hook(
    inner: Weak<DatabaseInner>,
    entry_key: EntryKey,
    id: EntryId,
) -> IdleHook {
    Box::new(move || {
        let Some(inner) = inner.upgrade() else {
            return true;
        };
        inner
            .entries
            .remove_if(&entry_key, |_, entry| entry.id == id && entry.is_idle())
            .is_some()
    })
}
