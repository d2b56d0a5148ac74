use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::decode_error;
use super::Payload;
use super::ResourcePlugin;
use super::ResourceSet;
use crate::store::ResourceItem;
use crate::PluginError;

pub const ADDRESS_CONFIG_PLUGIN: &str = "address-config";

const STORE_AND_FORWARD: &str = "store_and_forward";
const MULTICAST: &str = "multicast";

/// Routing flags of one address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressConfig {
    pub name: String,
    pub store_and_forward: bool,
    pub multicast: bool,
}

#[derive(Serialize)]
struct AddressFlags {
    store_and_forward: bool,
    multicast: bool,
}

/// Address configuration held in config maps.
///
/// Flags are looked up in the object's `data` map (either directly or inside
/// an embedded `json` document), then in the annotations, then in the labels.
/// A flag found nowhere is false.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressConfigPlugin;

impl AddressConfigPlugin {
    fn flag(
        item: &ResourceItem,
        embedded: Option<&Value>,
        key: &str,
    ) -> Result<bool, PluginError> {
        let data = item.object.get("data");

        let raw = data
            .and_then(|d| d.get(key))
            .or_else(|| embedded.and_then(|e| e.get(key)))
            .cloned()
            .or_else(|| item.annotations.get(key).map(|v| Value::String(v.clone())))
            .or_else(|| item.labels.get(key).map(|v| Value::String(v.clone())));

        match raw {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(b),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
            Some(other) => Err(decode_error(item, format!("{key} is not a boolean: {other}"))),
        }
    }
}

impl ResourcePlugin for AddressConfigPlugin {
    type Value = AddressConfig;

    const TYPE_NAME: &'static str = ADDRESS_CONFIG_PLUGIN;

    fn kinds(&self) -> &'static [&'static str] {
        &["ConfigMap"]
    }

    fn decode(
        &self,
        item: &ResourceItem,
    ) -> Result<AddressConfig, PluginError> {
        let embedded = match item.object.get("data").and_then(|d| d.get("json")) {
            Some(Value::String(doc)) => Some(
                serde_json::from_str::<Value>(doc)
                    .map_err(|e| decode_error(item, format!("embedded json: {e}")))?,
            ),
            _ => None,
        };

        Ok(AddressConfig {
            name: item.name.clone(),
            store_and_forward: Self::flag(item, embedded.as_ref(), STORE_AND_FORWARD)?,
            multicast: Self::flag(item, embedded.as_ref(), MULTICAST)?,
        })
    }

    fn encode(
        &self,
        values: &ResourceSet<AddressConfig>,
    ) -> Result<Payload, PluginError> {
        let body: BTreeMap<&str, AddressFlags> = values
            .iter()
            .map(|v| {
                (
                    v.name.as_str(),
                    AddressFlags {
                        store_and_forward: v.store_and_forward,
                        multicast: v.multicast,
                    },
                )
            })
            .collect();
        Ok(Payload::json(serde_json::to_vec(&body)?))
    }
}
