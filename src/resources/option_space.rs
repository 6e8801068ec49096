//! The `nios_option_space` resource: a namespace for vendor DHCP option
//! definitions.
//!
//! Option spaces carry no extensible attributes, so this type opts out of
//! EA reconciliation and rediscovery entirely. It is also the type whose
//! delete is routinely blocked while option definitions still reference
//! it, so deletes ride out conflicts for the configured window.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

use super::{with_common_attributes, ResourceSpec, ResourceType};

const SPEC: ResourceSpec = ResourceSpec {
    type_name: "nios_option_space",
    objtype: "dhcpoptionspace",
    return_fields: &["name", "comment", "space_type"],
    uses_extattrs: false,
    retry_delete_on_conflict: true,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OptionSpaceModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    // Server-assigned; never sent.
    #[serde(skip_serializing, default)]
    space_type: Option<String>,
}

/// The `nios_option_space` resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptionSpaceResource;

impl ResourceType for OptionSpaceResource {
    fn spec(&self) -> &'static ResourceSpec {
        &SPEC
    }

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_description("A vendor DHCP option space")
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Option space name"),
            )
            .with_attribute("comment", Attribute::optional_string())
            .with_attribute(
                "space_type",
                Attribute::computed_string().with_description("Server-assigned space kind"),
            );
        with_common_attributes(schema, SPEC.uses_extattrs)
    }

    fn expand(&self, state: &Value) -> Result<Value, ProviderError> {
        let model: OptionSpaceModel = serde_json::from_value(state.clone())?;
        Ok(serde_json::to_value(&model)?)
    }

    fn flatten(&self, object: &Value) -> Result<serde_json::Map<String, Value>, ProviderError> {
        let model: OptionSpaceModel = serde_json::from_value(object.clone())?;
        let mut map = match serde_json::to_value(&model)? {
            Value::Object(map) => map,
            _ => unreachable!("struct serializes to an object"),
        };
        // space_type is skipped on serialize; carry it into state by hand.
        if let Some(space_type) = model.space_type {
            map.insert("space_type".to_string(), Value::String(space_type));
        }
        Ok(map)
    }
}
