//! The provider lifecycle surface and its NIOS implementation.
//!
//! [`ProviderService`] is the contract a host (plan engine, test harness)
//! drives: schema discovery, configuration, plan, CRUD, import, and data
//! sources. [`NiosProvider`] implements it for the Infoblox grid,
//! dispatching each call to the matching [`ResourceType`] and the shared
//! orchestration in [`crate::resources`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::NiosConfig;
use crate::error::ProviderError;
use crate::extattrs::ExtAttrs;
use crate::resources::{
    self, MacFilterAddressResource, OptionSpaceResource, RangeResource, RangeTemplateResource,
    ResourceType, RoamingHostResource,
};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, ProviderSchema, Schema};
use crate::types::{diff_attributes, ImportedResource, PlanResult, ProviderMetadata};
use crate::validation::validate;
use crate::wapi::{ObjectApi, WapiClient};

/// Trait that provider implementations expose to their host.
///
/// Uses ergonomic Rust types; diagnostics carry user-visible problems,
/// [`ProviderError`] carries operational failures.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Return the provider's schema including all resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
        }
    }

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    ///
    /// Returning `Value::Null` removes the resource from state.
    async fn read(&self, resource_type: &str, current_state: Value)
        -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "Unknown data source type: {}",
            data_source_type
        )))
    }
}

struct Configured {
    api: Arc<dyn ObjectApi>,
    delete_conflict_window: Duration,
}

/// The Infoblox NIOS provider.
pub struct NiosProvider {
    resources: HashMap<&'static str, Box<dyn ResourceType>>,
    data_sources: HashMap<&'static str, &'static str>,
    configured: RwLock<Option<Configured>>,
}

impl Default for NiosProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NiosProvider {
    /// Create an unconfigured provider.
    pub fn new() -> Self {
        let mut resources: HashMap<&'static str, Box<dyn ResourceType>> = HashMap::new();
        for resource in [
            Box::new(RangeResource) as Box<dyn ResourceType>,
            Box::new(RangeTemplateResource),
            Box::new(RoamingHostResource),
            Box::new(OptionSpaceResource),
            Box::new(MacFilterAddressResource),
        ] {
            resources.insert(resource.spec().type_name, resource);
        }

        // Data sources share the resource's objtype and Flatten.
        let mut data_sources = HashMap::new();
        data_sources.insert("nios_range", "nios_range");
        data_sources.insert("nios_range_template", "nios_range_template");

        Self {
            resources,
            data_sources,
            configured: RwLock::new(None),
        }
    }

    /// Create a provider bound to an existing API implementation.
    ///
    /// Used by tests to swap in an in-memory grid; production code goes
    /// through [`ProviderService::configure`].
    pub fn with_api(api: Arc<dyn ObjectApi>, delete_conflict_window: Duration) -> Self {
        let provider = Self::new();
        *provider.configured.write().expect("provider lock poisoned") = Some(Configured {
            api,
            delete_conflict_window,
        });
        provider
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn ResourceType, ProviderError> {
        self.resources
            .get(resource_type)
            .map(AsRef::as_ref)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn api(&self) -> Result<(Arc<dyn ObjectApi>, Duration), ProviderError> {
        let guard = self.configured.read().expect("provider lock poisoned");
        guard
            .as_ref()
            .map(|c| (Arc::clone(&c.api), c.delete_conflict_window))
            .ok_or_else(|| {
                ProviderError::Configuration("provider has not been configured".to_string())
            })
    }

    /// Drop the provider-injected internal ID from prior state's `extattrs`
    /// before diffing; the user never declared it, and leaving it in would
    /// flag every plan as a change.
    fn strip_internal_id(mut prior: Value) -> Value {
        if let Some(extattrs) = prior
            .get_mut("extattrs")
            .and_then(Value::as_object_mut)
        {
            extattrs.remove(crate::extattrs::INTERNAL_ID_EA);
        }
        prior
    }

    /// Fill schema defaults into a proposed state.
    fn apply_defaults(schema: &Schema, mut proposed: Value) -> Value {
        if let Some(map) = proposed.as_object_mut() {
            for (name, attr) in &schema.attributes {
                if let Some(default) = &attr.default {
                    let missing = map
                        .get(name.as_str())
                        .map(Value::is_null)
                        .unwrap_or(true);
                    if missing {
                        map.insert(name.clone(), default.clone());
                    }
                }
            }
        }
        proposed
    }

    fn data_source_schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "filters",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::optional(),
                )
                .with_description("Field filters applied to the search"),
            )
            .with_attribute(
                "results",
                Attribute::new(
                    AttributeType::list(AttributeType::Dynamic),
                    AttributeFlags::computed(),
                ),
            )
    }

    fn filters_of(config: &Value) -> Result<BTreeMap<String, String>, ProviderError> {
        let mut filters = BTreeMap::new();
        match config.get("filters") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (field, value) in map {
                    let rendered = match value {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        other => {
                            return Err(ProviderError::InvalidRequest(format!(
                                "filter '{}' must be a scalar, got {}",
                                field, other
                            )))
                        }
                    };
                    filters.insert(field.clone(), rendered);
                }
            }
            Some(other) => {
                return Err(ProviderError::InvalidRequest(format!(
                    "filters must be a map, got {}",
                    other
                )))
            }
        }
        Ok(filters)
    }
}

#[async_trait::async_trait]
impl ProviderService for NiosProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(NiosConfig::schema());
        for (name, resource) in &self.resources {
            schema = schema.with_resource(*name, resource.schema());
        }
        for name in self.data_sources.keys() {
            schema = schema.with_data_source(*name, Self::data_source_schema());
        }
        schema
    }

    #[instrument(skip(self, config), name = "provider.validate_config")]
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&NiosConfig::schema(), &config);
        if diagnostics.is_empty() {
            if let Err(more) = NiosConfig::from_value(&config) {
                diagnostics.extend(more);
            }
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let parsed = match NiosConfig::from_value(&config) {
            Ok(parsed) => parsed,
            Err(diagnostics) => return Ok(diagnostics),
        };

        let client = WapiClient::new(&parsed)?;
        let window = Duration::from_secs(parsed.delete_conflict_timeout_secs);
        *self.configured.write().expect("provider lock poisoned") = Some(Configured {
            api: Arc::new(client),
            delete_conflict_window: window,
        });

        info!(server = %parsed.server, wapi_version = %parsed.wapi_version, "provider configured");
        Ok(vec![])
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok(validate(&resource.schema(), &config))
    }

    #[instrument(skip(self, prior_state, proposed_state, config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let _ = config;
        let resource = self.resource(resource_type)?;
        let schema = resource.schema();

        // Destroy plan: nothing to compute.
        if proposed_state.is_null() {
            return Ok(PlanResult::no_change(Value::Null));
        }

        let proposed = Self::apply_defaults(&schema, proposed_state);
        match prior_state {
            None => {
                let (changes, _) = diff_attributes(&schema, &Value::Null, &proposed);
                debug!(resource_type, changes = changes.len(), "planned create");
                Ok(PlanResult::with_changes(proposed, changes, false))
            }
            Some(prior) => {
                let prior = Self::strip_internal_id(prior);
                let (changes, requires_replace) = diff_attributes(&schema, &prior, &proposed);
                debug!(
                    resource_type,
                    changes = changes.len(),
                    requires_replace,
                    "planned update"
                );
                Ok(PlanResult::with_changes(proposed, changes, requires_replace))
            }
        }
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let (api, _) = self.api()?;
        info!(resource_type, "creating object");
        resources::create(api.as_ref(), resource, &planned_state).await
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let (api, _) = self.api()?;
        resources::read(api.as_ref(), resource, &current_state).await
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let (api, _) = self.api()?;
        info!(resource_type, "updating object");
        resources::update(api.as_ref(), resource, &prior_state, &planned_state).await
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let (api, window) = self.api()?;
        info!(resource_type, "deleting object");
        resources::delete(api.as_ref(), resource, &current_state, window).await
    }

    #[instrument(skip(self), name = "provider.import")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let (api, _) = self.api()?;
        let state = resources::import(api.as_ref(), resource, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        if !self.data_sources.contains_key(data_source_type) {
            return Err(ProviderError::UnknownResource(data_source_type.to_string()));
        }
        Ok(validate(&Self::data_source_schema(), &config))
    }

    #[instrument(skip(self, config), name = "provider.read_data_source")]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let resource_name = self
            .data_sources
            .get(data_source_type)
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))?;
        let resource = self.resource(resource_name)?;
        let spec = resource.spec();
        let (api, _) = self.api()?;

        let filters = Self::filters_of(&config)?;
        let objects = api
            .search(spec.objtype, &filters, spec.return_fields)
            .await?;

        let mut results = Vec::with_capacity(objects.len());
        for object in &objects {
            let mut entry = resource.flatten(object)?;
            if let Some(reference) = object.get("_ref").and_then(Value::as_str) {
                entry.insert("ref".to_string(), Value::String(reference.to_string()));
            }
            if spec.uses_extattrs {
                // Data sources are read-only; expose every EA on the object.
                let all = ExtAttrs::from_object(object)?;
                entry.insert("extattrs".to_string(), all.to_flat());
            }
            results.push(Value::Object(entry));
        }
        debug!(data_source_type, results = results.len(), "data source read");

        let mut state = serde_json::Map::new();
        state.insert(
            "filters".to_string(),
            config.get("filters").cloned().unwrap_or(Value::Null),
        );
        state.insert("results".to_string(), Value::Array(results));
        Ok(Value::Object(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeWapi;
    use serde_json::json;

    fn test_provider() -> (NiosProvider, Arc<FakeWapi>) {
        let api = Arc::new(FakeWapi::new());
        let provider =
            NiosProvider::with_api(api.clone() as Arc<dyn ObjectApi>, Duration::from_millis(50));
        (provider, api)
    }

    #[test]
    fn test_schema_lists_all_types() {
        let provider = NiosProvider::new();
        let schema = provider.schema();

        for name in [
            "nios_range",
            "nios_range_template",
            "nios_roaming_host",
            "nios_option_space",
            "nios_mac_filter_address",
        ] {
            assert!(schema.resources.contains_key(name), "missing {name}");
        }
        assert!(schema.data_sources.contains_key("nios_range"));
        assert!(schema.provider.attributes.contains_key("server"));

        let metadata = provider.metadata();
        assert_eq!(metadata.resources.len(), 5);
        assert_eq!(metadata.data_sources.len(), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_refuses_crud() {
        let provider = NiosProvider::new();
        let err = provider
            .create("nios_range", json!({"start_addr": "a", "end_addr": "b"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (provider, _) = test_provider();
        let err = provider.read("nios_nonexistent", json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_validate_provider_config() {
        let provider = NiosProvider::new();
        let diagnostics = provider
            .validate_provider_config(json!({
                "server": "https://gm.example.net",
                "username": "admin",
                "password": "infoblox",
            }))
            .await
            .unwrap();
        assert!(diagnostics.is_empty());

        let diagnostics = provider
            .validate_provider_config(json!({"server": "https://gm.example.net"}))
            .await
            .unwrap();
        assert!(!diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_plan_create_applies_defaults() {
        let (provider, _) = test_provider();
        let plan = provider
            .plan(
                "nios_roaming_host",
                None,
                json!({"name": "laptop-7"}),
                json!({"name": "laptop-7"}),
            )
            .await
            .unwrap();

        assert_eq!(plan.planned_state["match_client"], "MAC_ADDRESS");
        assert_eq!(plan.planned_state["disable"], false);
        assert!(!plan.requires_replace);
        assert!(!plan.changes.is_empty());
    }

    #[tokio::test]
    async fn test_plan_update_flags_replacement() {
        let (provider, _) = test_provider();
        let prior = json!({
            "filter": "guests",
            "mac": "aa:bb:cc:dd:ee:ff",
            "never_expires": true,
            "ref": "macfilteraddress/x",
        });
        let proposed = json!({
            "filter": "contractors",
            "mac": "aa:bb:cc:dd:ee:ff",
            "never_expires": true,
        });

        let plan = provider
            .plan(
                "nios_mac_filter_address",
                Some(prior),
                proposed.clone(),
                proposed,
            )
            .await
            .unwrap();

        assert!(plan.requires_replace);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "filter");
    }

    #[tokio::test]
    async fn test_plan_no_diff_is_empty() {
        let (provider, _) = test_provider();
        let state = json!({
            "name": "tmpl-1",
            "number_of_addresses": 100,
            "offset": 10,
        });

        let plan = provider
            .plan(
                "nios_range_template",
                Some(state.clone()),
                state.clone(),
                state,
            )
            .await
            .unwrap();
        assert!(plan.changes.is_empty());
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_plan_ignores_internal_id_in_prior_extattrs() {
        let (provider, _) = test_provider();
        let prior = json!({
            "name": "tmpl-1",
            "number_of_addresses": 100,
            "offset": 10,
            "ref": "rangetemplate/a:tmpl-1",
            "extattrs": {
                "Site": "NYC",
                crate::extattrs::INTERNAL_ID_EA: "abc-123",
            },
        });
        let proposed = json!({
            "name": "tmpl-1",
            "number_of_addresses": 100,
            "offset": 10,
            "extattrs": {"Site": "NYC"},
        });

        let plan = provider
            .plan("nios_range_template", Some(prior), proposed.clone(), proposed)
            .await
            .unwrap();
        assert!(plan.changes.is_empty(), "changes: {:?}", plan.changes);
    }

    #[tokio::test]
    async fn test_plan_destroy() {
        let (provider, _) = test_provider();
        let plan = provider
            .plan(
                "nios_range_template",
                Some(json!({"name": "tmpl-1"})),
                Value::Null,
                Value::Null,
            )
            .await
            .unwrap();
        assert!(plan.planned_state.is_null());
        assert!(plan.changes.is_empty());
    }

    #[tokio::test]
    async fn test_data_source_search() {
        let (provider, api) = test_provider();
        api.insert(
            "rangetemplate/a:tmpl-1",
            json!({
                "_ref": "rangetemplate/a:tmpl-1",
                "name": "tmpl-1",
                "number_of_addresses": 100,
                "offset": 10,
                "extattrs": {"Site": {"value": "NYC"}},
            }),
        );
        api.insert(
            "rangetemplate/b:tmpl-2",
            json!({
                "_ref": "rangetemplate/b:tmpl-2",
                "name": "tmpl-2",
                "number_of_addresses": 50,
                "offset": 0,
            }),
        );

        let state = provider
            .read_data_source("nios_range_template", json!({"filters": {"name": "tmpl-1"}}))
            .await
            .unwrap();

        let results = state["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["name"], "tmpl-1");
        assert_eq!(results[0]["ref"], "rangetemplate/a:tmpl-1");
        assert_eq!(results[0]["extattrs"]["Site"], "NYC");
    }

    #[tokio::test]
    async fn test_data_source_rejects_non_scalar_filter() {
        let (provider, _) = test_provider();
        let err = provider
            .read_data_source("nios_range", json!({"filters": {"name": ["a"]}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let (provider, _) = test_provider();
        let diagnostics = provider
            .validate_resource_config(
                "nios_range_template",
                json!({"name": "tmpl", "number_of_addresses": "lots", "offset": 0}),
            )
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("number_of_addresses".to_string())
        );
    }
}
