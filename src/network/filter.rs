//! Mapping between the wire filter structure and [`SubscriptionKey`].
//!
//! The filter is a `google.protobuf.Struct` with two optional namespaces,
//! `labels` and `annotations`, each a struct of string values. Any other
//! shape degrades to the empty filter instead of rejecting the link.

use prost_types::value::Kind;
use prost_types::Struct;
use prost_types::Value;
use tracing::warn;

use crate::store::Labels;
use crate::subscription::SubscriptionKey;

pub const LABELS_FIELD: &str = "labels";
pub const ANNOTATIONS_FIELD: &str = "annotations";

pub fn parse_filter(filter: Option<&Struct>) -> SubscriptionKey {
    let Some(filter) = filter else {
        return SubscriptionKey::default();
    };

    match try_parse(filter) {
        Some(key) => key,
        None => {
            warn!(?filter, "malformed subscription filter, falling back to empty filter");
            SubscriptionKey::default()
        }
    }
}

fn try_parse(filter: &Struct) -> Option<SubscriptionKey> {
    if filter
        .fields
        .keys()
        .any(|k| k != LABELS_FIELD && k != ANNOTATIONS_FIELD)
    {
        return None;
    }
    Some(SubscriptionKey::new(
        namespace(filter, LABELS_FIELD)?,
        namespace(filter, ANNOTATIONS_FIELD)?,
    ))
}

fn namespace(
    filter: &Struct,
    name: &str,
) -> Option<Labels> {
    match filter.fields.get(name).and_then(|v| v.kind.as_ref()) {
        None | Some(Kind::NullValue(_)) => Some(Labels::new()),
        Some(Kind::StructValue(map)) => map
            .fields
            .iter()
            .map(|(k, v)| match &v.kind {
                Some(Kind::StringValue(s)) => Some((k.clone(), s.clone())),
                _ => None,
            })
            .collect(),
        Some(_) => None,
    }
}

/// Builds the wire filter for a key; empty namespaces are omitted.
pub fn filter_to_struct(key: &SubscriptionKey) -> Struct {
    let mut filter = Struct::default();
    for (name, map) in [(LABELS_FIELD, &key.labels), (ANNOTATIONS_FIELD, &key.annotations)] {
        if map.is_empty() {
            continue;
        }
        let fields = map
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    Value {
                        kind: Some(Kind::StringValue(v.clone())),
                    },
                )
            })
            .collect();
        filter.fields.insert(
            name.to_string(),
            Value {
                kind: Some(Kind::StructValue(Struct { fields })),
            },
        );
    }
    filter
}
