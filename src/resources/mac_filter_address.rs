//! The `nios_mac_filter_address` resource: one MAC entry inside a MAC
//! address filter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

use super::{with_common_attributes, ResourceSpec, ResourceType};

const SPEC: ResourceSpec = ResourceSpec {
    type_name: "nios_mac_filter_address",
    objtype: "macfilteraddress",
    return_fields: &[
        "extattrs",
        "filter",
        "mac",
        "username",
        "comment",
        "expiration_time",
        "never_expires",
    ],
    uses_extattrs: true,
    retry_delete_on_conflict: false,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MacFilterAddressModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    never_expires: Option<bool>,
}

/// The `nios_mac_filter_address` resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacFilterAddressResource;

impl ResourceType for MacFilterAddressResource {
    fn spec(&self) -> &'static ResourceSpec {
        &SPEC
    }

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_description("A MAC address entry in a MAC filter")
            .with_attribute(
                "filter",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Name of the MAC filter the entry belongs to"),
            )
            .with_attribute(
                "mac",
                Attribute::required_string().with_description("Filtered MAC address"),
            )
            .with_attribute("username", Attribute::optional_string())
            .with_attribute("comment", Attribute::optional_string())
            .with_attribute(
                "expiration_time",
                Attribute::optional_int64()
                    .with_description("Epoch seconds at which the entry expires"),
            )
            .with_attribute(
                "never_expires",
                Attribute::optional_bool().with_default(serde_json::json!(true)),
            );
        with_common_attributes(schema, SPEC.uses_extattrs)
    }

    fn expand(&self, state: &Value) -> Result<Value, ProviderError> {
        let model: MacFilterAddressModel = serde_json::from_value(state.clone())?;
        if model.never_expires == Some(true) && model.expiration_time.is_some() {
            return Err(ProviderError::Validation(
                "expiration_time cannot be set while never_expires is true".to_string(),
            ));
        }
        Ok(serde_json::to_value(&model)?)
    }

    fn flatten(&self, object: &Value) -> Result<serde_json::Map<String, Value>, ProviderError> {
        let model: MacFilterAddressModel = serde_json::from_value(object.clone())?;
        match serde_json::to_value(&model)? {
            Value::Object(map) => Ok(map),
            _ => unreachable!("struct serializes to an object"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand() {
        let resource = MacFilterAddressResource;
        let body = resource
            .expand(&json!({
                "filter": "guests",
                "mac": "aa:bb:cc:dd:ee:ff",
                "username": "visitor",
                "never_expires": true,
            }))
            .unwrap();

        assert_eq!(body["filter"], "guests");
        assert_eq!(body["never_expires"], true);
    }

    #[test]
    fn test_expand_rejects_contradictory_expiry() {
        let resource = MacFilterAddressResource;
        let err = resource
            .expand(&json!({
                "filter": "guests",
                "mac": "aa:bb:cc:dd:ee:ff",
                "never_expires": true,
                "expiration_time": 1893456000,
            }))
            .unwrap_err();

        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[test]
    fn test_expand_allows_expiring_entry() {
        let resource = MacFilterAddressResource;
        let body = resource
            .expand(&json!({
                "filter": "guests",
                "mac": "aa:bb:cc:dd:ee:ff",
                "never_expires": false,
                "expiration_time": 1893456000,
            }))
            .unwrap();
        assert_eq!(body["expiration_time"], 1893456000i64);
    }

    #[test]
    fn test_flatten() {
        let resource = MacFilterAddressResource;
        let state = resource
            .flatten(&json!({
                "_ref": "macfilteraddress/w:guests:aa",
                "filter": "guests",
                "mac": "aa:bb:cc:dd:ee:ff",
                "never_expires": true,
            }))
            .unwrap();

        assert_eq!(state["mac"], "aa:bb:cc:dd:ee:ff");
        assert!(state.get("_ref").is_none());
    }

    #[test]
    fn test_schema_filter_forces_replacement() {
        let schema = MacFilterAddressResource.schema();
        assert!(schema.attributes["filter"].force_new);
        assert!(schema.attributes["mac"].flags.required);
    }
}
