//! Managed NIOS object types.
//!
//! Every resource follows the same pattern: a schema describing its
//! attributes, an Expand function turning planned state into a WAPI
//! request body, and a Flatten function turning a WAPI object back into
//! state attributes. The lifecycle glue — internal-ID tagging, inherited
//! extensible-attribute reconciliation, rediscovery, and the bounded
//! delete retry — is shared and lives in the orchestration functions
//! here, so the per-type modules stay purely declarative.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::extattrs::{ensure_internal_id, merge_inherited, split_owned, ExtAttrs};
use crate::reconcile::{delete_with_retry, resolve_object, Resolution};
use crate::schema::{Attribute, Schema};
use crate::wapi::ObjectApi;

mod mac_filter_address;
mod option_space;
mod range;
mod range_template;
mod roaming_host;

pub use mac_filter_address::MacFilterAddressResource;
pub use option_space::OptionSpaceResource;
pub use range::RangeResource;
pub use range_template::RangeTemplateResource;
pub use roaming_host::RoamingHostResource;

/// How long to wait between delete attempts while an object is in use.
const DELETE_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Static description of a managed object type.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSpec {
    /// The resource type name users write, e.g. `nios_range`.
    pub type_name: &'static str,
    /// The WAPI object type, e.g. `range`.
    pub objtype: &'static str,
    /// Extra fields requested on every response (`_return_fields+`).
    pub return_fields: &'static [&'static str],
    /// Whether the object type carries extensible attributes.
    pub uses_extattrs: bool,
    /// Whether deletes should ride out in-use conflicts for a bounded
    /// window (option spaces stay referenced by their option definitions
    /// until those are cleaned up).
    pub retry_delete_on_conflict: bool,
}

/// A managed object type: schema plus the Expand/Flatten pair.
///
/// Implementations are stateless; everything an operation needs arrives
/// through its parameters.
pub trait ResourceType: Send + Sync {
    /// The static description of this type.
    fn spec(&self) -> &'static ResourceSpec;

    /// The schema for this resource.
    fn schema(&self) -> Schema;

    /// Convert planned state into a WAPI request body.
    ///
    /// Only type-specific fields are produced; extensible attributes are
    /// injected by the orchestration after reconciliation.
    fn expand(&self, state: &Value) -> Result<Value, ProviderError>;

    /// Convert a WAPI object into state attributes.
    ///
    /// Only type-specific fields are produced; `ref`, `extattrs`, and
    /// `extattrs_all` are filled in by the orchestration.
    fn flatten(&self, object: &Value) -> Result<serde_json::Map<String, Value>, ProviderError>;
}

/// Add the attributes every resource schema shares.
pub(crate) fn with_common_attributes(schema: Schema, uses_extattrs: bool) -> Schema {
    let schema = schema.with_attribute(
        "ref",
        Attribute::computed_string().with_description("Grid-assigned object reference"),
    );
    if !uses_extattrs {
        return schema;
    }
    schema
        .with_attribute("extattrs", Attribute::extattrs())
        .with_attribute("extattrs_all", Attribute::extattrs_all())
        .with_attribute(
            "imported",
            Attribute::computed_bool()
                .with_description("Set until an imported object has a correlation ID established"),
        )
}

fn require_ref(state: &Value) -> Result<&str, ProviderError> {
    state
        .get("ref")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::InvalidRequest("state has no object ref".to_string()))
}

fn object_ref(object: &Value) -> Result<&str, ProviderError> {
    object
        .get("_ref")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::InvalidRequest("WAPI object has no _ref".to_string()))
}

fn state_extattrs(state: &Value, field: &str) -> Result<ExtAttrs, ProviderError> {
    ExtAttrs::from_flat(state.get(field).unwrap_or(&Value::Null))
}

fn set_body_extattrs(body: &mut Value, attrs: &ExtAttrs) -> Result<(), ProviderError> {
    body.as_object_mut()
        .ok_or_else(|| ProviderError::InvalidRequest("expanded body is not an object".to_string()))?
        .insert("extattrs".to_string(), serde_json::to_value(attrs)?);
    Ok(())
}

/// Assemble final state from a WAPI object, applying the EA split.
fn finish_state(
    resource: &dyn ResourceType,
    object: &Value,
    declared: &ExtAttrs,
    imported: bool,
) -> Result<Value, ProviderError> {
    let mut state = resource.flatten(object)?;
    state.insert("ref".to_string(), Value::String(object_ref(object)?.to_string()));

    if resource.spec().uses_extattrs {
        let server_all = ExtAttrs::from_object(object)?;
        let (owned, all) = split_owned(declared, &server_all);
        state.insert("extattrs".to_string(), owned.to_flat());
        state.insert("extattrs_all".to_string(), all.to_flat());
        state.insert("imported".to_string(), Value::Bool(imported));
    }

    Ok(Value::Object(state))
}

/// Create an object from planned state.
pub async fn create(
    api: &dyn ObjectApi,
    resource: &dyn ResourceType,
    planned: &Value,
) -> Result<Value, ProviderError> {
    let spec = resource.spec();
    let mut body = resource.expand(planned)?;

    let declared = if spec.uses_extattrs {
        state_extattrs(planned, "extattrs")?
    } else {
        ExtAttrs::new()
    };
    if spec.uses_extattrs {
        let (tagged, _) = ensure_internal_id(&declared);
        set_body_extattrs(&mut body, &tagged)?;
    }

    let object = api.create(spec.objtype, &body, spec.return_fields).await?;
    debug!(resource_type = spec.type_name, "created object");
    finish_state(resource, &object, &declared, false)
}

/// Refresh state from the grid.
///
/// Returns `Value::Null` when the object no longer exists anywhere the
/// provider can see; the caller removes it from state.
pub async fn read(
    api: &dyn ObjectApi,
    resource: &dyn ResourceType,
    current: &Value,
) -> Result<Value, ProviderError> {
    let spec = resource.spec();
    let reference = require_ref(current)?;

    if !spec.uses_extattrs {
        return match api.get_by_ref(reference, spec.return_fields).await {
            Ok(object) => finish_state(resource, &object, &ExtAttrs::new(), false),
            Err(e) if e.is_not_found() => Ok(Value::Null),
            Err(e) => Err(e),
        };
    }

    let declared = state_extattrs(current, "extattrs")?;
    let stored_all = state_extattrs(current, "extattrs_all")?;

    match resolve_object(api, spec.objtype, reference, &stored_all, spec.return_fields).await? {
        Resolution::Gone => {
            debug!(resource_type = spec.type_name, reference, "object gone, removing from state");
            Ok(Value::Null)
        }
        Resolution::Found(object) => {
            let remote = ExtAttrs::from_object(&object)?;
            let object = if remote.internal_id().is_none() {
                // Imported or adopted object: establish the correlation key
                // so later drift can be ridden out.
                let (tagged, _) = ensure_internal_id(&remote);
                api.update(
                    object_ref(&object)?,
                    &serde_json::json!({ "extattrs": tagged }),
                    spec.return_fields,
                )
                .await?
            } else {
                object
            };
            finish_state(resource, &object, &declared, false)
        }
    }
}

/// Apply planned state to an existing object.
pub async fn update(
    api: &dyn ObjectApi,
    resource: &dyn ResourceType,
    prior: &Value,
    planned: &Value,
) -> Result<Value, ProviderError> {
    let spec = resource.spec();
    let reference = require_ref(prior)?;
    let mut body = resource.expand(planned)?;

    let declared = if spec.uses_extattrs {
        state_extattrs(planned, "extattrs")?
    } else {
        ExtAttrs::new()
    };
    let stored_all = state_extattrs(prior, "extattrs_all")?;
    if spec.uses_extattrs {
        // Carry attributes the grid added out-of-band, then make sure the
        // correlation key survives the write.
        let merged = merge_inherited(&declared, &stored_all);
        let (merged, _) = ensure_internal_id(&merged);
        set_body_extattrs(&mut body, &merged)?;
    }

    let object = match api.update(reference, &body, spec.return_fields).await {
        Ok(object) => object,
        Err(e) if e.is_not_found() && spec.uses_extattrs => {
            // The stored ref went stale; relocate the object and write to
            // its current ref.
            match resolve_object(api, spec.objtype, reference, &stored_all, spec.return_fields)
                .await?
            {
                Resolution::Found(found) => {
                    api.update(object_ref(&found)?, &body, spec.return_fields)
                        .await?
                }
                Resolution::Gone => return Err(e),
            }
        }
        Err(e) => return Err(e),
    };
    debug!(resource_type = spec.type_name, "updated object");
    finish_state(resource, &object, &declared, false)
}

/// Remove an object from the grid.
pub async fn delete(
    api: &dyn ObjectApi,
    resource: &dyn ResourceType,
    current: &Value,
    conflict_window: Duration,
) -> Result<(), ProviderError> {
    let spec = resource.spec();
    let reference = require_ref(current)?;

    if spec.retry_delete_on_conflict {
        delete_with_retry(api, reference, conflict_window, DELETE_RETRY_INTERVAL).await
    } else {
        match api.delete(reference).await {
            Ok(_) => Ok(()),
            // Deleted out-of-band already; nothing to do.
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Adopt an existing object by reference.
///
/// The resulting state is marked `imported`; the next Read establishes the
/// internal ID on the grid copy if it lacks one.
pub async fn import(
    api: &dyn ObjectApi,
    resource: &dyn ResourceType,
    reference: &str,
) -> Result<Value, ProviderError> {
    let spec = resource.spec();
    let object = api.get_by_ref(reference, spec.return_fields).await?;
    finish_state(resource, &object, &ExtAttrs::new(), true)
}
