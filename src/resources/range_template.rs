//! The `nios_range_template` resource: a reusable range shape applied at
//! network creation time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

use super::{with_common_attributes, ResourceSpec, ResourceType};

const SPEC: ResourceSpec = ResourceSpec {
    type_name: "nios_range_template",
    objtype: "rangetemplate",
    return_fields: &[
        "extattrs",
        "name",
        "number_of_addresses",
        "offset",
        "comment",
    ],
    uses_extattrs: true,
    retry_delete_on_conflict: false,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RangeTemplateModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    number_of_addresses: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

/// The `nios_range_template` resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct RangeTemplateResource;

impl ResourceType for RangeTemplateResource {
    fn spec(&self) -> &'static ResourceSpec {
        &SPEC
    }

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_description("A template describing ranges created alongside networks")
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Template name"),
            )
            .with_attribute(
                "number_of_addresses",
                Attribute::required_int64()
                    .with_description("How many addresses the generated range covers"),
            )
            .with_attribute(
                "offset",
                Attribute::required_int64()
                    .with_description("Address offset from the network start"),
            )
            .with_attribute("comment", Attribute::optional_string());
        with_common_attributes(schema, SPEC.uses_extattrs)
    }

    fn expand(&self, state: &Value) -> Result<Value, ProviderError> {
        let model: RangeTemplateModel = serde_json::from_value(state.clone())?;
        Ok(serde_json::to_value(&model)?)
    }

    fn flatten(&self, object: &Value) -> Result<serde_json::Map<String, Value>, ProviderError> {
        let model: RangeTemplateModel = serde_json::from_value(object.clone())?;
        match serde_json::to_value(&model)? {
            Value::Object(map) => Ok(map),
            _ => unreachable!("struct serializes to an object"),
        }
    }
}
