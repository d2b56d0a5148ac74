use std::fmt;

use crate::store::Labels;
use crate::store::ResourceItem;

/// Sharing granularity of an observation.
///
/// Two keys are equal iff both filter maps are equal by content. Subscribers
/// presenting equal keys for the same domain share one observer and one
/// manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    /// Applied by the resource store on list and watch
    pub labels: Labels,
    /// Applied after decode; every entry must match exactly
    pub annotations: Labels,
}

impl SubscriptionKey {
    pub fn new(
        labels: Labels,
        annotations: Labels,
    ) -> Self {
        Self { labels, annotations }
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

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.annotations.is_empty()
    }

    /// True iff the item carries every requested annotation with the exact
    /// requested value. An empty annotation filter accepts every item.
    pub fn matches_annotations(
        &self,
        item: &ResourceItem,
    ) -> bool {
        self.annotations.iter().all(|(k, v)| item.annotations.get(k) == Some(v))
    }
}

fn write_map(
    f: &mut fmt::Formatter<'_>,
    map: &Labels,
) -> fmt::Result {
    f.write_str("{")?;
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{k}={v}")?;
    }
    f.write_str("}")
}

impl fmt::Display for SubscriptionKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("labels=")?;
        write_map(f, &self.labels)?;
        f.write_str(" annotations=")?;
        write_map(f, &self.annotations)
    }
}
