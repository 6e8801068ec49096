//! The `nios_roaming_host` resource: a client that keeps its DHCP
//! properties wherever it attaches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

use super::{with_common_attributes, ResourceSpec, ResourceType};

const SPEC: ResourceSpec = ResourceSpec {
    type_name: "nios_roaming_host",
    objtype: "roaminghost",
    return_fields: &[
        "extattrs",
        "name",
        "mac",
        "match_client",
        "comment",
        "disable",
    ],
    uses_extattrs: true,
    retry_delete_on_conflict: false,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RoamingHostModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    match_client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disable: Option<bool>,
}

/// The `nios_roaming_host` resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoamingHostResource;

impl ResourceType for RoamingHostResource {
    fn spec(&self) -> &'static ResourceSpec {
        &SPEC
    }

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_description("A roaming DHCP client")
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Host name"),
            )
            .with_attribute(
                "mac",
                Attribute::optional_string().with_description("Client MAC address"),
            )
            .with_attribute(
                "match_client",
                Attribute::optional_string()
                    .with_default(serde_json::json!("MAC_ADDRESS"))
                    .with_description("How the client is matched to this entry"),
            )
            .with_attribute("comment", Attribute::optional_string())
            .with_attribute(
                "disable",
                Attribute::optional_bool().with_default(serde_json::json!(false)),
            );
        with_common_attributes(schema, SPEC.uses_extattrs)
    }

    fn expand(&self, state: &Value) -> Result<Value, ProviderError> {
        let model: RoamingHostModel = serde_json::from_value(state.clone())?;
        Ok(serde_json::to_value(&model)?)
    }

    fn flatten(&self, object: &Value) -> Result<serde_json::Map<String, Value>, ProviderError> {
        let model: RoamingHostModel = serde_json::from_value(object.clone())?;
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
        let resource = RoamingHostResource;
        let body = resource
            .expand(&json!({
                "name": "laptop-7",
                "mac": "aa:bb:cc:dd:ee:ff",
                "match_client": "MAC_ADDRESS",
                "extattrs": {"Owner": "net-team"},
            }))
            .unwrap();

        assert_eq!(body["name"], "laptop-7");
        assert_eq!(body["mac"], "aa:bb:cc:dd:ee:ff");
        assert!(body.get("extattrs").is_none());
    }

    #[test]
    fn test_flatten() {
        let resource = RoamingHostResource;
        let state = resource
            .flatten(&json!({
                "_ref": "roaminghost/y:laptop-7",
                "name": "laptop-7",
                "mac": "aa:bb:cc:dd:ee:ff",
                "disable": true,
            }))
            .unwrap();

        assert_eq!(state["name"], "laptop-7");
        assert_eq!(state["disable"], true);
        assert!(state.get("_ref").is_none());
    }

    #[test]
    fn test_schema_shape() {
        let schema = RoamingHostResource.schema();
        assert!(schema.attributes["name"].flags.required);
        assert!(schema.attributes["mac"].flags.optional);
        assert_eq!(
            schema.attributes["match_client"].default,
            Some(json!("MAC_ADDRESS"))
        );
    }
}
