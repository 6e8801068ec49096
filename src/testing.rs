//! Testing utilities for the provider.
//!
//! [`ProviderTester`] wraps a [`ProviderService`] implementation and
//! exposes simplified lifecycle methods for tests. [`FakeWapi`] is an
//! in-memory grid implementing [`ObjectApi`], with scripted failures for
//! exercising rediscovery and the delete-conflict retry without a network.
//!
//! # Example
//!
//! ```ignore
//! use nios_provider::testing::{FakeWapi, ProviderTester};
//! use nios_provider::NiosProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_template() {
//!     let api = std::sync::Arc::new(FakeWapi::new());
//!     let provider = NiosProvider::with_api(api, std::time::Duration::from_secs(1));
//!     let tester = ProviderTester::new(provider);
//!
//!     let state = tester.create("nios_range_template", json!({
//!         "name": "tmpl-1", "number_of_addresses": 100, "offset": 10,
//!     })).await.unwrap();
//!
//!     assert_eq!(state["name"], "tmpl-1");
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::provider::ProviderService;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{ImportedResource, PlanResult};
use crate::wapi::ObjectApi;

// =========================================================================
// Provider tester
// =========================================================================

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Validate provider configuration, failing on error diagnostics.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// Run a full create lifecycle: plan → create → read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan → update → read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run a full CRUD lifecycle: create → read → update → read → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state.clone(), updated_config)
            .await?;
        self.delete(resource_type, updated_state.clone()).await?;
        Ok(updated_state)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

/// Check diagnostics and return an error if any are errors.
pub fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan result indicates changes are needed.
///
/// # Panics
///
/// Panics if the plan has no changes.
pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

// =========================================================================
// In-memory grid
// =========================================================================

/// An in-memory [`ObjectApi`] implementation.
///
/// Stores objects by ref in sorted order (so search results are
/// deterministic), echoes created and updated bodies back like the WAPI
/// does, and supports scripted failures.
#[derive(Default)]
pub struct FakeWapi {
    objects: Mutex<BTreeMap<String, Value>>,
    inherited: Mutex<BTreeMap<String, Value>>,
    get_failures: Mutex<HashMap<String, u16>>,
    delete_conflicts: Mutex<HashMap<String, usize>>,
    delete_attempts: Mutex<HashMap<String, usize>>,
    next_id: AtomicU64,
}

impl FakeWapi {
    /// Create an empty grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an object into the grid under the given ref.
    pub fn insert(&self, reference: &str, mut object: Value) {
        object["_ref"] = Value::String(reference.to_string());
        self.objects
            .lock()
            .expect("fake grid lock poisoned")
            .insert(reference.to_string(), object);
    }

    /// Remove an object, simulating an out-of-band delete.
    pub fn remove(&self, reference: &str) {
        self.objects
            .lock()
            .expect("fake grid lock poisoned")
            .remove(reference);
    }

    /// Move an object to a new ref, simulating an out-of-band rename.
    pub fn rekey(&self, old_reference: &str, new_reference: &str) {
        let mut objects = self.objects.lock().expect("fake grid lock poisoned");
        if let Some(mut object) = objects.remove(old_reference) {
            object["_ref"] = Value::String(new_reference.to_string());
            objects.insert(new_reference.to_string(), object);
        }
    }

    /// Fetch a stored object by ref.
    pub fn get_object(&self, reference: &str) -> Option<Value> {
        self.objects
            .lock()
            .expect("fake grid lock poisoned")
            .get(reference)
            .cloned()
    }

    /// Attach an extensible attribute to every subsequently created object,
    /// simulating inheritance from a parent scope.
    pub fn inherit_on_create(&self, name: &str, value: Value) {
        self.inherited
            .lock()
            .expect("fake grid lock poisoned")
            .insert(name.to_string(), value);
    }

    /// Make GETs of the given ref fail with HTTP 500.
    pub fn fail_get_with_server_error(&self, reference: &str) {
        self.get_failures
            .lock()
            .expect("fake grid lock poisoned")
            .insert(reference.to_string(), 500);
    }

    /// Make the next `times` deletes of the given ref fail with an in-use
    /// conflict.
    pub fn fail_delete_with_conflict(&self, reference: &str, times: usize) {
        self.delete_conflicts
            .lock()
            .expect("fake grid lock poisoned")
            .insert(reference.to_string(), times);
    }

    /// How many delete attempts the given ref has seen.
    pub fn delete_attempts(&self, reference: &str) -> usize {
        self.delete_attempts
            .lock()
            .expect("fake grid lock poisoned")
            .get(reference)
            .copied()
            .unwrap_or(0)
    }

    fn apply_inherited(&self, object: &mut Value) {
        let inherited = self.inherited.lock().expect("fake grid lock poisoned");
        if inherited.is_empty() {
            return;
        }
        let extattrs = object
            .as_object_mut()
            .expect("stored objects are JSON objects")
            .entry("extattrs")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Some(map) = extattrs.as_object_mut() {
            for (name, value) in inherited.iter() {
                map.entry(name.clone())
                    .or_insert_with(|| serde_json::json!({ "value": value }));
            }
        }
    }

    fn matches_extattr(object: &Value, name: &str, value: &str) -> bool {
        object
            .get("extattrs")
            .and_then(|ea| ea.get(name))
            .and_then(|entry| entry.get("value"))
            .and_then(Value::as_str)
            == Some(value)
    }

    fn matches_filters(object: &Value, filters: &BTreeMap<String, String>) -> bool {
        filters.iter().all(|(field, expected)| {
            match object.get(field) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Number(n)) => n.to_string() == *expected,
                Some(Value::Bool(b)) => b.to_string() == *expected,
                _ => false,
            }
        })
    }
}

#[async_trait]
impl ObjectApi for FakeWapi {
    async fn get_by_ref(
        &self,
        reference: &str,
        _return_fields: &[&str],
    ) -> Result<Value, ProviderError> {
        if let Some(status) = self
            .get_failures
            .lock()
            .expect("fake grid lock poisoned")
            .get(reference)
        {
            return Err(ProviderError::Api {
                status: *status,
                message: "scripted failure".to_string(),
            });
        }
        self.get_object(reference)
            .ok_or_else(|| ProviderError::NotFound(reference.to_string()))
    }

    async fn create(
        &self,
        objtype: &str,
        body: &Value,
        _return_fields: &[&str],
    ) -> Result<Value, ProviderError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let reference = format!("{}/fake{:04}:{}", objtype, n, objtype);

        let mut object = body.clone();
        self.apply_inherited(&mut object);
        self.insert(&reference, object);
        Ok(self.get_object(&reference).expect("object just inserted"))
    }

    async fn update(
        &self,
        reference: &str,
        body: &Value,
        _return_fields: &[&str],
    ) -> Result<Value, ProviderError> {
        let mut objects = self.objects.lock().expect("fake grid lock poisoned");
        let object = objects
            .get_mut(reference)
            .ok_or_else(|| ProviderError::NotFound(reference.to_string()))?;

        let target = object
            .as_object_mut()
            .expect("stored objects are JSON objects");
        if let Some(fields) = body.as_object() {
            for (field, value) in fields {
                target.insert(field.clone(), value.clone());
            }
        }
        Ok(Value::Object(target.clone()))
    }

    async fn delete(&self, reference: &str) -> Result<String, ProviderError> {
        *self
            .delete_attempts
            .lock()
            .expect("fake grid lock poisoned")
            .entry(reference.to_string())
            .or_insert(0) += 1;

        let mut conflicts = self.delete_conflicts.lock().expect("fake grid lock poisoned");
        if let Some(remaining) = conflicts.get_mut(reference) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(ProviderError::Conflict(format!(
                    "Cannot delete {}: referenced by another object",
                    reference
                )));
            }
        }
        drop(conflicts);

        let mut objects = self.objects.lock().expect("fake grid lock poisoned");
        if objects.remove(reference).is_some() {
            Ok(reference.to_string())
        } else {
            Err(ProviderError::NotFound(reference.to_string()))
        }
    }

    async fn search_by_extattr(
        &self,
        objtype: &str,
        name: &str,
        value: &str,
        _return_fields: &[&str],
    ) -> Result<Vec<Value>, ProviderError> {
        let prefix = format!("{}/", objtype);
        let objects = self.objects.lock().expect("fake grid lock poisoned");
        Ok(objects
            .iter()
            .filter(|(reference, object)| {
                reference.starts_with(&prefix) && Self::matches_extattr(object, name, value)
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn search(
        &self,
        objtype: &str,
        filters: &BTreeMap<String, String>,
        _return_fields: &[&str],
    ) -> Result<Vec<Value>, ProviderError> {
        let prefix = format!("{}/", objtype);
        let objects = self.objects.lock().expect("fake grid lock poisoned");
        Ok(objects
            .iter()
            .filter(|(reference, object)| {
                reference.starts_with(&prefix) && Self::matches_filters(object, filters)
            })
            .map(|(_, object)| object.clone())
            .collect())
    }
}
