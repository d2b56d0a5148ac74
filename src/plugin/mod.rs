//! Per-resource-kind strategy bundles.
//!
//! A [`ResourcePlugin`] turns raw store items of one resource domain into
//! typed values, decides which values subscribers may see, and encodes a
//! value set into the payload streamed on every link of that domain.
//! Plugins are stateless and are invoked synchronously on the digestion path
//! of the observer and manager tasks.

mod address;
mod pod;
mod registry;
pub use address::*;
pub use pod::*;
pub use registry::*;


use std::collections::BTreeSet;
use std::fmt::Debug;

use bytes::Bytes;

use crate::store::ResourceItem;
use crate::PluginError;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The de-duplicated value set of one subscription key.
///
/// Ordered so that two sets compare equal by content and encode
/// deterministically.
pub type ResourceSet<V> = BTreeSet<V>;

/// Encoded snapshot ready to be pushed on a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content_type: &'static str,
    pub body: Bytes,
}

impl Payload {
    pub fn json(body: Vec<u8>) -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE,
            body: Bytes::from(body),
        }
    }
}

pub trait ResourcePlugin: Send + Sync + 'static {
    /// Typed projection of one store item. Equality is value equality.
    type Value: Clone + Ord + Debug + Send + Sync + 'static;

    /// Name used in domain bindings, e.g. "pod-topology"
    const TYPE_NAME: &'static str;

    /// Store kinds merged into one resource set for this domain
    fn kinds(&self) -> &'static [&'static str];

    /// Projects a raw item. A failure drops this item only.
    fn decode(
        &self,
        item: &ResourceItem,
    ) -> Result<Self::Value, PluginError>;

    /// Whether subscribers of the domain may see this value
    fn filter(
        &self,
        _value: &Self::Value,
    ) -> bool {
        true
    }

    fn encode(
        &self,
        values: &ResourceSet<Self::Value>,
    ) -> Result<Payload, PluginError>;
}

pub(crate) fn decode_error(
    item: &ResourceItem,
    reason: impl Into<String>,
) -> PluginError {
    PluginError::Decode {
        kind: item.kind.clone(),
        name: item.name.clone(),
        reason: reason.into(),
    }
}
