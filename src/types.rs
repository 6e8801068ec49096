//! Convenience types for the provider lifecycle.

use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<serde_json::Value>,
    /// The value after the change (None if deleting).
    pub after: Option<serde_json::Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(
        path: impl Into<String>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(
        path: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: serde_json::Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: serde_json::Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: serde_json::Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: serde_json::Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata describing the available types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
}

/// Diff prior state against proposed state under a schema.
///
/// Returns the attribute changes and whether any changed attribute is
/// marked `force_new` (which forces resource replacement). Computed-only
/// attributes (`ref`, `extattrs_all`, ...) are provider-owned and never
/// diffed; a prior value the proposal omits counts as a removal.
pub fn diff_attributes(
    schema: &Schema,
    prior: &serde_json::Value,
    proposed: &serde_json::Value,
) -> (Vec<AttributeChange>, bool) {
    let mut changes = Vec::new();
    let mut requires_replace = false;

    for (name, attr) in &schema.attributes {
        if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
            continue;
        }

        let before = non_null(prior.get(name.as_str()));
        let after = non_null(proposed.get(name.as_str()));

        let change = match (before, after) {
            (None, None) => continue,
            (None, Some(after)) => AttributeChange::added(name.clone(), after.clone()),
            (Some(before), None) => AttributeChange::removed(name.clone(), before.clone()),
            (Some(before), Some(after)) => {
                if before == after {
                    continue;
                }
                AttributeChange::modified(name.clone(), before.clone(), after.clone())
            }
        };

        if attr.force_new {
            requires_replace = true;
        }
        changes.push(change);
    }

    // Stable order for display and assertions.
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    (changes, requires_replace)
}

fn non_null(value: Option<&serde_json::Value>) -> Option<&serde_json::Value> {
    value.filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn range_schema() -> Schema {
        Schema::v0()
            .with_attribute("network", Attribute::required_string().with_force_new())
            .with_attribute("start_addr", Attribute::required_string())
            .with_attribute("comment", Attribute::optional_string())
            .with_attribute("ref", Attribute::computed_string())
    }

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("name", json!("test"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("test")));

        let removed = AttributeChange::removed("name", json!("old"));
        assert_eq!(removed.before, Some(json!("old")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("offset", json!(1), json!(2));
        assert_eq!(modified.before, Some(json!(1)));
        assert_eq!(modified.after, Some(json!(2)));
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"ref": "range/abc"}));
        assert!(no_change.changes.is_empty());
        assert!(!no_change.requires_replace);

        let with_changes = PlanResult::with_changes(
            json!({"comment": "new"}),
            vec![AttributeChange::modified("comment", json!("old"), json!("new"))],
            false,
        );
        assert_eq!(with_changes.changes.len(), 1);
    }

    #[test]
    fn test_diff_create_adds_everything() {
        let schema = range_schema();
        let proposed = json!({"network": "10.0.0.0/24", "start_addr": "10.0.0.10"});
        let (changes, replace) = diff_attributes(&schema, &json!({}), &proposed);

        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.before.is_none()));
        // force_new on an added attribute still means create, but the flag is
        // reported so the caller can decide; creation has no prior to replace.
        assert!(replace);
    }

    #[test]
    fn test_diff_in_place_update() {
        let schema = range_schema();
        let prior = json!({"network": "10.0.0.0/24", "start_addr": "10.0.0.10", "ref": "range/a"});
        let proposed =
            json!({"network": "10.0.0.0/24", "start_addr": "10.0.0.20", "ref": "range/a"});

        let (changes, replace) = diff_attributes(&schema, &prior, &proposed);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "start_addr");
        assert!(!replace);
    }

    #[test]
    fn test_diff_force_new_requires_replace() {
        let schema = range_schema();
        let prior = json!({"network": "10.0.0.0/24", "start_addr": "10.0.0.10"});
        let proposed = json!({"network": "10.0.1.0/24", "start_addr": "10.0.0.10"});

        let (changes, replace) = diff_attributes(&schema, &prior, &proposed);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "network");
        assert!(replace);
    }

    #[test]
    fn test_diff_skips_computed_attributes() {
        let schema = range_schema();
        let prior = json!({"network": "10.0.0.0/24", "start_addr": "10.0.0.10", "ref": "range/a"});
        let proposed =
            json!({"network": "10.0.0.0/24", "start_addr": "10.0.0.10", "ref": "range/b"});

        let (changes, _) = diff_attributes(&schema, &prior, &proposed);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_diff_removal() {
        let schema = range_schema();
        let prior = json!({"network": "n", "start_addr": "s", "comment": "old"});
        let proposed = json!({"network": "n", "start_addr": "s"});

        let (changes, replace) = diff_attributes(&schema, &prior, &proposed);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "comment");
        assert!(changes[0].after.is_none());
        assert!(!replace);
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("nios_range", json!({"ref": "range/abc"}));
        assert_eq!(imported.resource_type, "nios_range");
        assert_eq!(imported.state["ref"], "range/abc");
    }
}
