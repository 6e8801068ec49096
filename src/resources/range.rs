//! The `nios_range` resource: a DHCP address range.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

use super::{with_common_attributes, ResourceSpec, ResourceType};

const SPEC: ResourceSpec = ResourceSpec {
    type_name: "nios_range",
    objtype: "range",
    return_fields: &[
        "extattrs",
        "network",
        "network_view",
        "start_addr",
        "end_addr",
        "name",
        "comment",
        "disable",
        "options",
    ],
    uses_extattrs: true,
    retry_delete_on_conflict: false,
};

/// A DHCP option attached to a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpOption {
    /// Option name, e.g. `routers`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Option number, e.g. 3.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num: Option<i64>,
    /// Option value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Vendor class the option belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_class: Option<String>,
    /// Whether the option is applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_option: Option<bool>,
}

/// The managed fields of a WAPI `range` object.
///
/// Doubles as the Expand input (from planned state) and the Flatten output
/// (from a grid response); `_ref` and `extattrs` are handled by the
/// orchestration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RangeModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    network_view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Vec<DhcpOption>>,
}

/// The `nios_range` resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct RangeResource;

impl ResourceType for RangeResource {
    fn spec(&self) -> &'static ResourceSpec {
        &SPEC
    }

    fn schema(&self) -> Schema {
        let mut option_attrs = std::collections::HashMap::new();
        option_attrs.insert("name".to_string(), AttributeType::String);
        option_attrs.insert("num".to_string(), AttributeType::Int64);
        option_attrs.insert("value".to_string(), AttributeType::String);
        option_attrs.insert("vendor_class".to_string(), AttributeType::String);
        option_attrs.insert("use_option".to_string(), AttributeType::Bool);

        let schema = Schema::v0()
            .with_description("A DHCP address range")
            .with_attribute(
                "start_addr",
                Attribute::required_string().with_description("First address of the range"),
            )
            .with_attribute(
                "end_addr",
                Attribute::required_string().with_description("Last address of the range"),
            )
            .with_attribute(
                "network",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                    .with_force_new()
                    .with_description("Network the range belongs to, in CIDR form"),
            )
            .with_attribute(
                "network_view",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                    .with_force_new()
                    .with_default(serde_json::json!("default")),
            )
            .with_attribute("name", Attribute::optional_string())
            .with_attribute("comment", Attribute::optional_string())
            .with_attribute(
                "disable",
                Attribute::optional_bool().with_default(serde_json::json!(false)),
            )
            .with_attribute(
                "options",
                Attribute::new(
                    AttributeType::list(AttributeType::Object(option_attrs)),
                    AttributeFlags::optional(),
                )
                .with_description("DHCP options applied to the range"),
            );
        with_common_attributes(schema, SPEC.uses_extattrs)
    }

    fn expand(&self, state: &Value) -> Result<Value, ProviderError> {
        let model: RangeModel = serde_json::from_value(state.clone())?;
        Ok(serde_json::to_value(&model)?)
    }

    fn flatten(&self, object: &Value) -> Result<serde_json::Map<String, Value>, ProviderError> {
        let model: RangeModel = serde_json::from_value(object.clone())?;
        match serde_json::to_value(&model)? {
            Value::Object(map) => Ok(map),
            _ => unreachable!("struct serializes to an object"),
        }
    }
}
