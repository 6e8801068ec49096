//! Extensible-attribute handling.
//!
//! Extensible attributes (EAs) are key/value tags attached to NIOS objects.
//! On the wire each value is wrapped as `{"value": <string|int|bool>}`; in
//! configuration and state the map is flat (`{"Site": "NYC"}`).
//!
//! Three views of an object's EAs matter to the lifecycle:
//!
//! - *declared* — what the user wrote in configuration,
//! - *all* — everything the grid reports, including attributes inherited
//!   from parent objects and the provider's internal ID,
//! - *owned* — the declared subset re-read from the grid (plus the internal
//!   ID), which is what the user-facing `extattrs` state field carries.
//!
//! Inherited attributes the user never declared must not leak into
//! `extattrs` (they would show up as spurious diffs), and must not be
//! dropped on update (the grid would treat their absence as removal). The
//! [`merge_inherited`] / [`split_owned`] pair maintains both properties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// The reserved EA key carrying the provider's correlation token.
///
/// The grid-assigned `_ref` of some object types changes when the object is
/// renamed or moved outside the provider's control, so this EA is the
/// durable key used to relocate the object after such drift.
pub const INTERNAL_ID_EA: &str = "terraform_internal_id";

/// A single extensible-attribute value in its wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtAttrValue {
    /// The attribute value: a string, integer, or boolean.
    pub value: serde_json::Value,
}

impl ExtAttrValue {
    /// Wrap a JSON scalar as an EA value.
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// An ordered mapping from EA name to value, in wire shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtAttrs(BTreeMap<String, ExtAttrValue>);

impl ExtAttrs {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from the flat state/configuration form.
    ///
    /// `Null` is accepted and treated as empty. Values must be scalars;
    /// anything else is a validation error.
    pub fn from_flat(value: &serde_json::Value) -> Result<Self, ProviderError> {
        let mut attrs = BTreeMap::new();
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Object(map) => {
                for (name, v) in map {
                    if !(v.is_string() || v.is_number() || v.is_boolean()) {
                        return Err(ProviderError::Validation(format!(
                            "extensible attribute '{}' must be a string, number, or boolean",
                            name
                        )));
                    }
                    attrs.insert(name.clone(), ExtAttrValue::new(v.clone()));
                }
            }
            _ => {
                return Err(ProviderError::Validation(
                    "extattrs must be a map of scalar values".to_string(),
                ));
            }
        }
        Ok(Self(attrs))
    }

    /// Convert to the flat state form.
    pub fn to_flat(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(name, v)| (name.clone(), v.value.clone()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Number of attributes in the mapping.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&ExtAttrValue> {
        self.0.get(name)
    }

    /// Whether the mapping contains the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert an attribute, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: ExtAttrValue) {
        self.0.insert(name.into(), value);
    }

    /// Iterate over the attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtAttrValue)> {
        self.0.iter()
    }

    /// The internal-ID token stored in this mapping, if any.
    ///
    /// An empty string counts as absent.
    pub fn internal_id(&self) -> Option<&str> {
        self.get(INTERNAL_ID_EA)
            .and_then(ExtAttrValue::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Extract the wire-shape `extattrs` field from a WAPI object.
    ///
    /// An object without the field has no EAs.
    pub fn from_object(object: &serde_json::Value) -> Result<Self, ProviderError> {
        match object.get("extattrs") {
            None | Some(serde_json::Value::Null) => Ok(Self::new()),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }
}

impl FromIterator<(String, ExtAttrValue)> for ExtAttrs {
    fn from_iter<T: IntoIterator<Item = (String, ExtAttrValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Guarantee the mapping carries the internal-ID key.
///
/// If the key is already present the mapping is returned unchanged;
/// otherwise a freshly generated token is inserted. The returned flag
/// reports whether a token was generated. Pure aside from token
/// generation, which is infallible.
pub fn ensure_internal_id(declared: &ExtAttrs) -> (ExtAttrs, bool) {
    if declared.internal_id().is_some() {
        return (declared.clone(), false);
    }
    let mut tagged = declared.clone();
    tagged.insert(
        INTERNAL_ID_EA,
        ExtAttrValue::new(serde_json::Value::String(
            uuid::Uuid::new_v4().to_string(),
        )),
    );
    (tagged, true)
}

/// Combine the declared mapping with attributes the grid added out-of-band.
///
/// Every key present in the stored snapshot but absent from the declared
/// mapping is carried over; the user never controlled those keys and did
/// not intend to remove them. Declared values win on conflict. Used on
/// Update, immediately before Expand.
pub fn merge_inherited(declared: &ExtAttrs, stored_all: &ExtAttrs) -> ExtAttrs {
    let mut merged = declared.clone();
    for (name, value) in stored_all.iter() {
        if !merged.contains(name) {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

/// Split a grid response into the user-owned subset and the full snapshot.
///
/// `owned` holds the grid's authoritative values for exactly the keys the
/// user declared (so values normalize to server form), plus the internal-ID
/// key when the grid carries it. `all` is the untouched server mapping.
/// `owned` is always a subset of `all`.
pub fn split_owned(declared: &ExtAttrs, server_all: &ExtAttrs) -> (ExtAttrs, ExtAttrs) {
    let owned = server_all
        .iter()
        .filter(|(name, _)| declared.contains(name) || name.as_str() == INTERNAL_ID_EA)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    (owned, server_all.clone())
}
