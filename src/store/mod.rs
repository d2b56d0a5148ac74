//! Remote resource store capability.
//!
//! The subscription core never talks to a concrete cluster API. It depends on
//! the two primitives every watchable store offers:
//!
//! - `list(kind, labels)` returns the current items plus a resource-version
//!   cursor;
//! - `watch(kind, labels, cursor)` streams every change after that cursor.
//!
//! [`MemoryStore`] is a complete in-process implementation used by the
//! standalone binary and by tests.

mod memory;
pub use memory::*;


use std::collections::BTreeMap;
use std::fmt;

use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tonic::async_trait;

use crate::Result;

/// Label or annotation map. Ordered so that equality and hashing are by content.
pub type Labels = BTreeMap<String, String>;

/// Stream of changes produced by [`ResourceStore::watch`]
pub type WatchStream = BoxStream<'static, Result<WatchEvent>>;

/// One object observed in the remote store
///
/// Immutable once observed; every item carries a name, a kind and its label and
/// annotation maps. The full object body is kept opaque for plugins to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceItem {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub object: serde_json::Value,
}

impl ResourceItem {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            labels: Labels::new(),
            annotations: Labels::new(),
            object: serde_json::Value::Null,
        }
    }

    pub fn with_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_object(
        mut self,
        object: serde_json::Value,
    ) -> Self {
        self.object = object;
        self
    }

    /// Equality-based label selector: every selector entry must be present
    /// with the same value. An empty selector matches everything.
    pub fn matches_labels(
        &self,
        selector: &Labels,
    ) -> bool {
        selector.iter().all(|(k, v)| self.labels.get(k) == Some(v))
    }
}

/// Kind of change carried by a [`WatchEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Added,
    Modified,
    Deleted,
    Error,
}

impl fmt::Display for WatchAction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            WatchAction::Added => "ADDED",
            WatchAction::Modified => "MODIFIED",
            WatchAction::Deleted => "DELETED",
            WatchAction::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A single change reported by an open watch
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(ResourceItem),
    Modified(ResourceItem),
    Deleted(ResourceItem),
    /// The store gave up on this watch; the stream must be reopened from a relist
    Error(String),
}

impl WatchEvent {
    pub fn action(&self) -> WatchAction {
        match self {
            WatchEvent::Added(_) => WatchAction::Added,
            WatchEvent::Modified(_) => WatchAction::Modified,
            WatchEvent::Deleted(_) => WatchAction::Deleted,
            WatchEvent::Error(_) => WatchAction::Error,
        }
    }

    pub fn item(&self) -> Option<&ResourceItem> {
        match self {
            WatchEvent::Added(item) | WatchEvent::Modified(item) | WatchEvent::Deleted(item) => {
                Some(item)
            }
            WatchEvent::Error(_) => None,
        }
    }
}

/// Result of [`ResourceStore::list`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceList {
    /// Cursor to open a watch from, so no change between list and watch is lost
    pub resource_version: String,
    pub items: Vec<ResourceItem>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    /// Lists every item of `kind` matching the label selector.
    async fn list(
        &self,
        kind: &str,
        labels: &Labels,
    ) -> Result<ResourceList>;

    /// Opens a watch for `kind` delivering every change after `resource_version`.
    async fn watch(
        &self,
        kind: &str,
        labels: &Labels,
        resource_version: &str,
    ) -> Result<WatchStream>;
}
