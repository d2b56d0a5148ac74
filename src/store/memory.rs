//! In-process resource store with list/watch semantics.
//!
//! Items are kept per kind, keyed by name. Every mutation bumps a global
//! resource version and is recorded in a bounded change history so that a
//! watch opened from an older cursor replays the changes it missed. A cursor
//! older than the retained history is rejected, forcing the caller to relist.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::async_trait;
use tracing::debug;
use tracing::trace;

use super::Labels;
use super::ResourceItem;
use super::ResourceList;
use super::ResourceStore;
use super::WatchEvent;
use super::WatchStream;
use crate::Result;
use crate::StoreError;

const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// One recorded mutation: the item before and after the change
#[derive(Debug, Clone)]
struct Change {
    resource_version: u64,
    kind: String,
    before: Option<ResourceItem>,
    after: Option<ResourceItem>,
}

struct StoreWatcher {
    kind: String,
    selector: Labels,
    sender: mpsc::UnboundedSender<Result<WatchEvent>>,
}

impl StoreWatcher {
    /// Translates a change into what this watcher should see, following the
    /// selector: an item leaving the selector is reported as deleted, an item
    /// entering it as added.
    fn project(
        &self,
        change: &Change,
    ) -> Option<WatchEvent> {
        if change.kind != self.kind {
            return None;
        }
        let before = change.before.as_ref().filter(|i| i.matches_labels(&self.selector));
        let after = change.after.as_ref().filter(|i| i.matches_labels(&self.selector));
        match (before, after) {
            (None, Some(item)) => Some(WatchEvent::Added(item.clone())),
            (Some(_), Some(item)) => Some(WatchEvent::Modified(item.clone())),
            (Some(item), None) => Some(WatchEvent::Deleted(item.clone())),
            (None, None) => None,
        }
    }

    fn deliver(
        &self,
        change: &Change,
    ) -> bool {
        match self.project(change) {
            Some(event) => self.sender.send(Ok(event)).is_ok(),
            None => !self.sender.is_closed(),
        }
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    resource_version: u64,
    items: HashMap<String, BTreeMap<String, ResourceItem>>,
    history: VecDeque<Change>,
    history_limit: usize,
    watchers: Vec<StoreWatcher>,
    failing_lists: usize,
    list_calls: usize,
}

impl MemoryStoreInner {
    fn record(
        &mut self,
        kind: &str,
        before: Option<ResourceItem>,
        after: Option<ResourceItem>,
    ) {
        self.resource_version += 1;
        let change = Change {
            resource_version: self.resource_version,
            kind: kind.to_string(),
            before,
            after,
        };

        self.watchers.retain(|w| w.deliver(&change));

        self.history.push_back(change);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    fn oldest_replayable_version(&self) -> u64 {
        match self.history.front() {
            Some(change) => change.resource_version - 1,
            None => self.resource_version,
        }
    }
}

/// Thread-safe in-memory [`ResourceStore`]
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                history_limit,
                ..Default::default()
            })),
        }
    }

    /// Builds a store pre-populated from a JSON array of [`ResourceItem`]s.
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::InvalidSeed(format!("{}: {}", path.display(), e)))?;
        let items: Vec<ResourceItem> = serde_json::from_str(&raw)
            .map_err(|e| StoreError::InvalidSeed(format!("{}: {}", path.display(), e)))?;

        let store = Self::new();
        for item in items {
            store.apply(item);
        }
        debug!(path = %path.display(), "memory store seeded");
        Ok(store)
    }

    /// Creates or replaces an item; open watches see ADDED or MODIFIED.
    pub fn apply(
        &self,
        item: ResourceItem,
    ) -> u64 {
        let mut inner = self.inner.lock();
        let kind = item.kind.clone();
        let before = inner
            .items
            .entry(kind.clone())
            .or_default()
            .insert(item.name.clone(), item.clone());
        inner.record(&kind, before, Some(item));
        trace!(resource_version = inner.resource_version, kind = %kind, "item applied");
        inner.resource_version
    }

    /// Removes an item; open watches see DELETED. Returns whether it existed.
    pub fn delete(
        &self,
        kind: &str,
        name: &str,
    ) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.items.get_mut(kind).and_then(|items| items.remove(name));
        match removed {
            Some(item) => {
                inner.record(kind, Some(item), None);
                true
            }
            None => false,
        }
    }

    /// Sends an ERROR event to every open watch of `kind` and closes them.
    pub fn inject_watch_error(
        &self,
        kind: &str,
        reason: &str,
    ) {
        let mut inner = self.inner.lock();
        inner.watchers.retain(|w| {
            if w.kind != kind {
                return true;
            }
            let _ = w.sender.send(Ok(WatchEvent::Error(reason.to_string())));
            false
        });
    }

    /// Makes the next `count` list calls fail.
    pub fn fail_next_lists(
        &self,
        count: usize,
    ) {
        self.inner.lock().failing_lists = count;
    }

    /// Number of watches whose consumer is still alive.
    pub fn open_watch_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.watchers.retain(|w| !w.sender.is_closed());
        inner.watchers.len()
    }

    /// Number of list calls served so far, failed ones included.
    pub fn list_calls(&self) -> usize {
        self.inner.lock().list_calls
    }

    pub fn resource_version(&self) -> u64 {
        self.inner.lock().resource_version
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list(
        &self,
        kind: &str,
        labels: &Labels,
    ) -> Result<ResourceList> {
        let mut inner = self.inner.lock();
        inner.list_calls += 1;

        if inner.failing_lists > 0 {
            inner.failing_lists -= 1;
            return Err(StoreError::ListFailed {
                kind: kind.to_string(),
                reason: "injected list failure".into(),
            }
            .into());
        }

        let items = inner
            .items
            .get(kind)
            .map(|items| items.values().filter(|i| i.matches_labels(labels)).cloned().collect())
            .unwrap_or_default();

        Ok(ResourceList {
            resource_version: inner.resource_version.to_string(),
            items,
        })
    }

    async fn watch(
        &self,
        kind: &str,
        labels: &Labels,
        resource_version: &str,
    ) -> Result<WatchStream> {
        let watch_failed = |reason: &str| StoreError::WatchFailed {
            kind: kind.to_string(),
            resource_version: resource_version.to_string(),
            reason: reason.to_string(),
        };

        let from: u64 = resource_version
            .parse()
            .map_err(|_| watch_failed("resource version is not a number"))?;

        let mut inner = self.inner.lock();
        if from > inner.resource_version {
            return Err(watch_failed("resource version is in the future").into());
        }
        if from < inner.oldest_replayable_version() {
            return Err(watch_failed("resource version too old").into());
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let watcher = StoreWatcher {
            kind: kind.to_string(),
            selector: labels.clone(),
            sender,
        };

        for change in inner.history.iter().filter(|c| c.resource_version > from) {
            watcher.deliver(change);
        }
        inner.watchers.push(watcher);

        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }
}
